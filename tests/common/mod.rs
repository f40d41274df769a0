//! 集成测试公用的码流构造工具.
//!
//! 按 Vorbis I 位流格式合成最小可解码的头包与音频包, 并可封装为 Ogg 页面.
//! 码流只用一个 2 项 codebook (码字 0/1 分别对应 -1.0/+1.0),
//! floor1 只有两个端点, residue 为 type 2.

#![allow(dead_code)]

use yinliu::core::LsbBitWriter;
use yinliu::core::crc::ogg_crc32;

pub const SHORT_BLOCK: usize = 256;
pub const LONG_BLOCK: usize = 2048;
pub const SAMPLE_RATE: u32 = 44100;
pub const SERIAL: u32 = 0x5949_4E4C;

/// 默认的 floor 幅度, 约 -30 dB
pub const FLOOR_Y: u8 = 200;

const RESIDUE_END: usize = 256;
const RESIDUE_PARTITION: usize = 16;

pub fn identification_packet(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut p = Vec::with_capacity(30);
    p.push(0x01);
    p.extend_from_slice(b"vorbis");
    p.extend_from_slice(&0u32.to_le_bytes());
    p.push(channels);
    p.extend_from_slice(&sample_rate.to_le_bytes());
    p.extend_from_slice(&0i32.to_le_bytes());
    p.extend_from_slice(&128_000i32.to_le_bytes());
    p.extend_from_slice(&0i32.to_le_bytes());
    // short = 2^8, long = 2^11
    p.push((11 << 4) | 8);
    p.push(0x01);
    p
}

pub fn comment_packet(vendor: &str) -> Vec<u8> {
    let mut p = Vec::new();
    p.push(0x03);
    p.extend_from_slice(b"vorbis");
    p.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    p.extend_from_slice(vendor.as_bytes());
    p.extend_from_slice(&1u32.to_le_bytes());
    // 足够长的注释, 封装时跨越多个段
    let mut tag = b"DESCRIPTION=".to_vec();
    tag.resize(600, b'x');
    p.extend_from_slice(&(tag.len() as u32).to_le_bytes());
    p.extend_from_slice(&tag);
    p.push(0x01);
    p
}

pub fn setup_packet(channels: u8) -> Vec<u8> {
    let mut bw = LsbBitWriter::new();
    bw.write_bits(0x05, 8);
    bw.write_bytes(b"vorbis");

    // codebooks: 1 个, 1 维 2 项, lattice VQ 取值 {-1, +1}
    bw.write_bits(0, 8);
    bw.write_bits(0x564342, 24);
    bw.write_bits(1, 16);
    bw.write_bits(2, 24);
    bw.write_bit(false);
    bw.write_bit(false);
    bw.write_bits(0, 5);
    bw.write_bits(0, 5);
    bw.write_bits(1, 4);
    bw.write_bits(0x8000_0000 | (788 << 21) | 1, 32);
    bw.write_bits((788 << 21) | 2, 32);
    bw.write_bits(0, 4);
    bw.write_bit(false);
    bw.write_bits(0, 1);
    bw.write_bits(1, 1);

    // time domain
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);

    // floors: floor1, 无分区, multiplier = 1, range_bits = 8
    bw.write_bits(0, 6);
    bw.write_bits(1, 16);
    bw.write_bits(0, 5);
    bw.write_bits(0, 2);
    bw.write_bits(8, 4);

    // residues: type 2, [0, 256), 分区 16, 单一分类只有 pass 0
    bw.write_bits(0, 6);
    bw.write_bits(2, 16);
    bw.write_bits(0, 24);
    bw.write_bits(RESIDUE_END as u32, 24);
    bw.write_bits(RESIDUE_PARTITION as u32 - 1, 24);
    bw.write_bits(0, 6);
    bw.write_bits(0, 8);
    bw.write_bits(1, 3);
    bw.write_bit(false);
    bw.write_bits(0, 8);

    // mappings
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);
    bw.write_bit(false);
    let coupled = channels == 2;
    bw.write_bit(coupled);
    if coupled {
        bw.write_bits(0, 8);
        bw.write_bits(0, 1);
        bw.write_bits(1, 1);
    }
    bw.write_bits(0, 2);
    bw.write_bits(0, 8);
    bw.write_bits(0, 8);
    bw.write_bits(0, 8);

    // modes: 0 为短块, 1 为长块
    bw.write_bits(1, 6);
    for long in [false, true] {
        bw.write_bit(long);
        bw.write_bits(0, 16);
        bw.write_bits(0, 16);
        bw.write_bits(0, 8);
    }
    bw.write_bit(true);
    bw.finish()
}

/// 三个头包
pub fn header_packets(channels: u8) -> Vec<Vec<u8>> {
    vec![
        identification_packet(channels, SAMPLE_RATE),
        comment_packet("yinliu test encoder"),
        setup_packet(channels),
    ]
}

/// 线性同余序列, 为 residue 提供确定的码字
pub struct Lcg(pub u32);

impl Lcg {
    pub fn next_bit(&mut self) -> bool {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 31 == 1
    }
}

/// 音频包
///
/// `floor_y` 为 `None` 的声道 floor 标记为未使用.
pub fn audio_packet(channels: usize, long: bool, floor_y: &[Option<u8>], seed: u32) -> Vec<u8> {
    let mut bw = LsbBitWriter::new();
    bw.write_bit(false);
    bw.write_bits(u32::from(long), 1);
    if long {
        bw.write_bit(true);
        bw.write_bit(true);
    }
    for ch in 0..channels {
        match floor_y.get(ch).copied().flatten() {
            Some(y) => {
                bw.write_bit(true);
                bw.write_bits(u32::from(y), 8);
                bw.write_bits(u32::from(y), 8);
            }
            None => bw.write_bit(false),
        }
    }

    let half = block_size(long) / 2;
    let partitions = RESIDUE_END.min(half * channels) / RESIDUE_PARTITION;
    let mut rng = Lcg(seed);
    for _ in 0..partitions {
        bw.write_bit(false);
        for _ in 0..RESIDUE_PARTITION {
            bw.write_bit(rng.next_bit());
        }
    }
    bw.finish()
}

/// 所有声道都使用默认 floor 的音频包
pub fn loud_packet(channels: usize, long: bool, seed: u32) -> Vec<u8> {
    audio_packet(channels, long, &vec![Some(FLOOR_Y); channels], seed)
}

pub fn block_size(long: bool) -> usize {
    if long { LONG_BLOCK } else { SHORT_BLOCK }
}

/// 完整码流: 头包加上按块序列生成的音频包
///
/// 奇数序号的音频包尾部补 300 个零字节, 解码时被忽略, 但封装后超过一个段.
pub fn stream_packets(channels: u8, blocks: &[bool]) -> Vec<Vec<u8>> {
    let mut packets = header_packets(channels);
    for (i, &long) in blocks.iter().enumerate() {
        let mut packet = loud_packet(usize::from(channels), long, 0x1234 + i as u32);
        if i % 2 == 1 {
            packet.resize(packet.len() + 300, 0);
        }
        packets.push(packet);
    }
    packets
}

/// 每个音频包应产出的帧数
pub fn expected_frames(blocks: &[bool]) -> Vec<usize> {
    let mut out = Vec::with_capacity(blocks.len());
    for (i, &long) in blocks.iter().enumerate() {
        if i == 0 {
            out.push(0);
        } else {
            out.push(block_size(blocks[i - 1]) / 4 + block_size(long) / 4);
        }
    }
    out
}

/// 单个 Ogg 页面, CRC 已填入
pub fn ogg_page(header_type: u8, granule: u64, seq: u32, segments: &[u8], data: &[u8]) -> Vec<u8> {
    let mut page = Vec::with_capacity(27 + segments.len() + data.len());
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&SERIAL.to_le_bytes());
    page.extend_from_slice(&seq.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(segments.len() as u8);
    page.extend_from_slice(segments);
    page.extend_from_slice(data);
    let crc = ogg_crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// 把 packet 序列封装为 Ogg 页面, 每页至多 `max_segments` 个段
///
/// packet 可以跨页, 后续页面置 continued 标志.
pub fn ogg_stream(packets: &[Vec<u8>], max_segments: usize) -> Vec<u8> {
    let max_segments = max_segments.clamp(1, 255);
    let mut lacing = Vec::new();
    let mut data = Vec::new();
    for packet in packets {
        let mut left = packet.len();
        while left >= 255 {
            lacing.push(255u8);
            left -= 255;
        }
        lacing.push(left as u8);
        data.extend_from_slice(packet);
    }

    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut continued = false;
    let chunks: Vec<&[u8]> = lacing.chunks(max_segments).collect();
    for (seq, segments) in chunks.iter().enumerate() {
        let size: usize = segments.iter().map(|&s| usize::from(s)).sum();
        let mut flags = 0u8;
        if continued {
            flags |= 0x01;
        }
        if seq == 0 {
            flags |= 0x02;
        }
        if seq + 1 == chunks.len() {
            flags |= 0x04;
        }
        out.extend(ogg_page(
            flags,
            seq as u64,
            seq as u32,
            segments,
            &data[offset..offset + size],
        ));
        offset += size;
        continued = segments.last() == Some(&255);
    }
    out
}
