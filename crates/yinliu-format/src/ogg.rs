//! Ogg 页面读取与 packet 重组.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 长度小于 255 的段结束一个 packet; 以 255 结尾的页面, 其最后一个 packet 延续到下一页.

use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};
use yinliu_codec::PacketSource;
use yinliu_core::crc::ogg_crc32_update;
use yinliu_core::{CorruptKind, YinliuError, YinliuResult};

/// Ogg 同步字 (capture pattern)
const OGG_SYNC: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const CRC_OFFSET: usize = 22;

/// 读取选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OggReaderOptions {
    /// 校验页面 CRC, 关闭后不匹配的页面照常使用
    pub verify_crc: bool,
}

impl Default for OggReaderOptions {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// 已读入的页面
#[derive(Debug, Default)]
struct OggPage {
    segment_table: Vec<u8>,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketState {
    /// 尚未开始或上一个 packet 已被跳过
    Idle,
    Open,
    /// 当前 packet 数据已读完
    Ended,
}

/// 基于 [`Read`] 的 Ogg packet 来源
///
/// 序列号、粒度位置与 BOS/EOS 标志不参与重组, 输入视为单个逻辑流.
pub struct OggPacketReader<R: Read> {
    reader: R,
    options: OggReaderOptions,
    page: OggPage,
    /// 当前页下一个段的下标
    next_segment: usize,
    /// 当前段在页面数据中的读取位置
    data_pos: usize,
    seg_left: usize,
    /// 当前段长度小于 255
    seg_terminal: bool,
    state: PacketState,
    pages_read: u64,
}

impl<R: Read> OggPacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, OggReaderOptions::default())
    }

    pub fn with_options(reader: R, options: OggReaderOptions) -> Self {
        Self {
            reader,
            options,
            page: OggPage::default(),
            next_segment: 0,
            data_pos: 0,
            seg_left: 0,
            seg_terminal: true,
            state: PacketState::Idle,
            pages_read: 0,
        }
    }

    /// 已读取的页面数
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// 读取下一个页面, 返回 `false` 表示流已结束
    fn load_page(&mut self) -> YinliuResult<bool> {
        let mut header = [0u8; PAGE_HEADER_LEN];
        let got = read_up_to(&mut self.reader, &mut header)?;
        if got < PAGE_HEADER_LEN {
            if got > 0 {
                trace!("Ogg 流末尾剩余 {got} 字节不足一个页头, 忽略");
            }
            return Ok(false);
        }

        if &header[0..4] != OGG_SYNC {
            return Err(YinliuError::corrupt(
                CorruptKind::Signature,
                "无效的 Ogg 同步字",
            ));
        }
        let version = header[4];
        if version != 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::Signature,
                format!("不支持的 Ogg 版本: {version}"),
            ));
        }
        let header_type = header[5];
        let granule_position = LittleEndian::read_u64(&header[6..14]);
        let serial_number = LittleEndian::read_u32(&header[14..18]);
        let page_sequence = LittleEndian::read_u32(&header[18..22]);
        let crc = LittleEndian::read_u32(&header[CRC_OFFSET..CRC_OFFSET + 4]);
        let num_segments = usize::from(header[26]);

        let mut segment_table = vec![0u8; num_segments];
        self.reader.read_exact(&mut segment_table)?;
        let data_size: usize = segment_table.iter().map(|&s| usize::from(s)).sum();
        let mut data = vec![0u8; data_size];
        self.reader.read_exact(&mut data)?;

        if self.options.verify_crc {
            // CRC 覆盖整个页面, CRC 字段本身按 0 参与计算
            header[CRC_OFFSET..CRC_OFFSET + 4].fill(0);
            let mut crc_calc = ogg_crc32_update(0, &header);
            crc_calc = ogg_crc32_update(crc_calc, &segment_table);
            crc_calc = ogg_crc32_update(crc_calc, &data);
            if crc != crc_calc {
                warn!(
                    "Ogg 页面 CRC 校验失败: seq={page_sequence}, 读取=0x{crc:08X}, 计算=0x{crc_calc:08X}"
                );
                return Err(YinliuError::corrupt(
                    CorruptKind::Checksum,
                    format!("Ogg 页面 CRC 校验失败: 读取=0x{crc:08X}, 计算=0x{crc_calc:08X}"),
                ));
            }
        }

        trace!(
            "Ogg 页面: serial={serial_number}, seq={page_sequence}, flags=0x{header_type:02X}, granule={granule_position}, segments={num_segments}, bytes={data_size}"
        );

        self.page = OggPage {
            segment_table,
            data,
        };
        self.next_segment = 0;
        self.data_pos = 0;
        self.pages_read += 1;
        Ok(true)
    }

    /// 前进到下一个段, 必要时读入新页面
    fn advance_segment(&mut self) -> YinliuResult<bool> {
        while self.next_segment >= self.page.segment_table.len() {
            if !self.load_page()? {
                return Ok(false);
            }
        }
        let len = usize::from(self.page.segment_table[self.next_segment]);
        self.next_segment += 1;
        self.seg_left = len;
        self.seg_terminal = len < 255;
        Ok(true)
    }
}

impl<R: Read> PacketSource for OggPacketReader<R> {
    fn next_packet(&mut self) -> YinliuResult<bool> {
        // 跳过当前 packet 未读的部分, 可能跨越多个页面
        while self.state == PacketState::Open {
            self.data_pos += self.seg_left;
            self.seg_left = 0;
            if self.seg_terminal || !self.advance_segment()? {
                break;
            }
        }

        self.state = PacketState::Idle;
        if !self.advance_segment()? {
            return Ok(false);
        }
        self.state = PacketState::Open;
        Ok(true)
    }

    fn read_packet_data(&mut self, buf: &mut [u8]) -> YinliuResult<usize> {
        while self.state == PacketState::Open {
            if self.seg_left > 0 {
                let n = buf.len().min(self.seg_left);
                buf[..n].copy_from_slice(&self.page.data[self.data_pos..self.data_pos + n]);
                self.data_pos += n;
                self.seg_left -= n;
                return Ok(n);
            }
            // 流在 packet 中途结束时, packet 止于最后一个可用字节
            if self.seg_terminal || !self.advance_segment()? {
                self.state = PacketState::Ended;
            }
        }
        Ok(0)
    }
}

/// 读取至多 `buf.len()` 字节, 只在流结束时少读
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use yinliu_core::crc::ogg_crc32;

    /// 按给定段表构造页面, 数据为各段拼接
    fn build_ogg_page(page_seq: u32, segments: &[u8], data: &[u8]) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(if page_seq == 0 { 0x02 } else { 0x00 });
        page.extend_from_slice(&0u64.to_le_bytes());
        page.extend_from_slice(&1u32.to_le_bytes());
        page.extend_from_slice(&page_seq.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(segments.len() as u8);
        page.extend_from_slice(segments);
        page.extend_from_slice(data);
        let crc = ogg_crc32(&page);
        page[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        page
    }

    fn read_packet(reader: &mut OggPacketReader<Cursor<Vec<u8>>>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read_packet_data(&mut buf).expect("读取失败");
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_单页多个packet() {
        let a = pattern(10, 1);
        let b = pattern(0, 2);
        let c = pattern(100, 3);
        let data = [a.clone(), c.clone()].concat();
        let stream = build_ogg_page(0, &[10, 0, 100], &data);
        let mut reader = OggPacketReader::new(Cursor::new(stream));

        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 3), a);
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 3), b);
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 64), c);
        assert!(!reader.next_packet().unwrap());
        assert_eq!(reader.pages_read(), 1);
    }

    #[test]
    fn test_packet跨页() {
        let big = pattern(600, 9);
        let tail = pattern(5, 4);
        let mut stream = build_ogg_page(0, &[255, 255], &big[..510]);
        stream.extend(build_ogg_page(
            1,
            &[90, 5],
            &[&big[510..], tail.as_slice()].concat(),
        ));
        let mut reader = OggPacketReader::new(Cursor::new(stream));

        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 200), big);
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 200), tail);
        assert!(!reader.next_packet().unwrap());
    }

    #[test]
    fn test_跳过未读的跨页packet() {
        let big = pattern(600, 9);
        let tail = pattern(5, 4);
        let mut stream = build_ogg_page(0, &[255, 255], &big[..510]);
        stream.extend(build_ogg_page(
            1,
            &[90, 5],
            &[&big[510..], tail.as_slice()].concat(),
        ));
        let mut reader = OggPacketReader::new(Cursor::new(stream));

        assert!(reader.next_packet().unwrap());
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_packet_data(&mut buf).unwrap(), 4);
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 16), tail);
    }

    #[test]
    fn test_流在packet中途结束() {
        let data = pattern(255, 1);
        let stream = build_ogg_page(0, &[255], &data);
        let mut reader = OggPacketReader::new(Cursor::new(stream));
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 100), data);
        assert!(!reader.next_packet().unwrap());
    }

    #[test]
    fn test_crc_校验开关() {
        let mut stream = build_ogg_page(0, &[3], &[1, 2, 3]);
        let last = stream.len() - 1;
        stream[last] ^= 0xFF;

        let mut reader = OggPacketReader::new(Cursor::new(stream.clone()));
        let err = reader.next_packet().unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::Checksum));

        let mut reader = OggPacketReader::with_options(
            Cursor::new(stream),
            OggReaderOptions { verify_crc: false },
        );
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 8), vec![1, 2, 0xFC]);
    }

    #[test]
    fn test_同步字与版本错误() {
        let mut stream = build_ogg_page(0, &[1], &[0]);
        stream[0] = b'X';
        let mut reader = OggPacketReader::new(Cursor::new(stream));
        let err = reader.next_packet().unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::Signature));

        let mut stream = build_ogg_page(0, &[1], &[0]);
        stream[4] = 1;
        let mut reader = OggPacketReader::with_options(
            Cursor::new(stream),
            OggReaderOptions { verify_crc: false },
        );
        let err = reader.next_packet().unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::Signature));
    }

    #[test]
    fn test_页面数据截断() {
        let mut stream = build_ogg_page(0, &[10], &pattern(10, 0));
        stream.truncate(stream.len() - 3);
        let mut reader = OggPacketReader::new(Cursor::new(stream));
        let err = reader.next_packet().unwrap_err();
        match err {
            YinliuError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("应为 I/O 错误: {other}"),
        }
    }

    #[test]
    fn test_末尾不足页头视为结束() {
        let mut stream = build_ogg_page(0, &[2], &[7, 8]);
        stream.extend_from_slice(b"OggS\0");
        let mut reader = OggPacketReader::new(Cursor::new(stream));
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 8), vec![7, 8]);
        assert!(!reader.next_packet().unwrap());
    }

    #[test]
    fn test_空页面被跳过() {
        let mut stream = build_ogg_page(0, &[], &[]);
        stream.extend(build_ogg_page(1, &[1], &[42]));
        let mut reader = OggPacketReader::new(Cursor::new(stream));
        assert!(reader.next_packet().unwrap());
        assert_eq!(read_packet(&mut reader, 8), vec![42]);
        assert_eq!(reader.pages_read(), 2);
    }
}
