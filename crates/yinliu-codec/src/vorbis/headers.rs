use yinliu_core::{ChannelLayout, CorruptKind, YinliuError, YinliuResult};

/// identification 头包固定长度
pub(crate) const IDENTIFICATION_LEN: usize = 30;

const MIN_BLOCK_BITS: u8 = 6;
const MAX_BLOCK_BITS: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IdentificationHeader {
    pub(crate) channels: u8,
    pub(crate) sample_rate: u32,
    pub(crate) short_block_bits: u8,
    pub(crate) long_block_bits: u8,
    pub(crate) bitrate_nominal: i32,
}

impl IdentificationHeader {
    pub(crate) fn short_block_size(&self) -> usize {
        1 << self.short_block_bits
    }

    pub(crate) fn long_block_size(&self) -> usize {
        1 << self.long_block_bits
    }

    pub(crate) fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_channels(u32::from(self.channels)).unwrap_or(ChannelLayout::MONO)
    }
}

pub(crate) fn parse_identification_header(packet: &[u8]) -> YinliuResult<IdentificationHeader> {
    if packet.len() < IDENTIFICATION_LEN {
        return Err(YinliuError::corrupt(
            CorruptKind::TruncatedHeader,
            format!("Vorbis identification 头包长度不足: {}", packet.len()),
        ));
    }
    if packet[0] != 0x01 || &packet[1..7] != b"vorbis" {
        return Err(YinliuError::corrupt(
            CorruptKind::Signature,
            "Vorbis identification 头包标识无效",
        ));
    }

    let version = u32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    if version != 0 {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            format!("Vorbis 版本不支持: {version}"),
        ));
    }

    let channels = packet[11];
    if channels == 0 {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            "Vorbis 声道数不能为 0",
        ));
    }
    if channels > 2 {
        return Err(YinliuError::Unsupported(format!(
            "Vorbis 声道数不支持: {channels}"
        )));
    }

    let sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
    if sample_rate == 0 {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            "Vorbis 采样率不能为 0",
        ));
    }
    let bitrate_nominal = i32::from_le_bytes([packet[20], packet[21], packet[22], packet[23]]);

    let bs = packet[28];
    let short_block_bits = bs & 0x0F;
    let long_block_bits = bs >> 4;
    let in_range = |b: u8| (MIN_BLOCK_BITS..=MAX_BLOCK_BITS).contains(&b);
    if !in_range(short_block_bits) || !in_range(long_block_bits) || long_block_bits < short_block_bits
    {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            format!(
                "Vorbis blocksize 非法: short_bits={short_block_bits}, long_bits={long_block_bits}"
            ),
        ));
    }

    if packet[29] & 0x01 == 0 {
        return Err(YinliuError::corrupt(
            CorruptKind::InvalidField,
            "Vorbis identification 头包 framing_flag 非法",
        ));
    }

    Ok(IdentificationHeader {
        channels,
        sample_rate,
        short_block_bits,
        long_block_bits,
        bitrate_nominal,
    })
}
