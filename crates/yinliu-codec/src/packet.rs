//! 压缩数据包来源.
//!
//! 解码核心只依赖 [`PacketSource`]: 逐个 packet 前进, 并按块读取当前 packet 的字节.
//! 页面分帧、分段表与校验由实现方负责.

use std::collections::VecDeque;

use bytes::Bytes;
use yinliu_core::YinliuResult;

/// packet 字节来源
pub trait PacketSource {
    /// 前进到下一个 packet
    ///
    /// 当前 packet 未读完的部分被丢弃. 返回 `false` 表示码流已结束.
    fn next_packet(&mut self) -> YinliuResult<bool>;

    /// 读取当前 packet 的后续字节
    ///
    /// 返回写入 `buf` 的字节数, `0` 表示当前 packet 已结束.
    fn read_packet_data(&mut self, buf: &mut [u8]) -> YinliuResult<usize>;
}

impl<P: PacketSource + ?Sized> PacketSource for &mut P {
    fn next_packet(&mut self) -> YinliuResult<bool> {
        (**self).next_packet()
    }

    fn read_packet_data(&mut self, buf: &mut [u8]) -> YinliuResult<usize> {
        (**self).read_packet_data(buf)
    }
}

impl<P: PacketSource + ?Sized> PacketSource for Box<P> {
    fn next_packet(&mut self) -> YinliuResult<bool> {
        (**self).next_packet()
    }

    fn read_packet_data(&mut self, buf: &mut [u8]) -> YinliuResult<usize> {
        (**self).read_packet_data(buf)
    }
}

/// 内存 packet 来源
///
/// 持有一组完整 packet, 可限制单次读取的块大小以模拟跨页 packet.
#[derive(Debug, Clone, Default)]
pub struct MemoryPacketSource {
    packets: VecDeque<Bytes>,
    current: Option<Bytes>,
    max_chunk: usize,
}

impl MemoryPacketSource {
    /// 从 packet 列表创建
    pub fn new<I, P>(packets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        Self {
            packets: packets.into_iter().map(Into::into).collect(),
            current: None,
            max_chunk: usize::MAX,
        }
    }

    /// 限制单次 `read_packet_data` 返回的最大字节数 (至少为 1)
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    /// 追加一个 packet
    pub fn push_packet(&mut self, packet: impl Into<Bytes>) {
        self.packets.push_back(packet.into());
    }

    /// 尚未开始读取的 packet 数量
    pub fn packets_left(&self) -> usize {
        self.packets.len()
    }
}

impl PacketSource for MemoryPacketSource {
    fn next_packet(&mut self) -> YinliuResult<bool> {
        self.current = self.packets.pop_front();
        Ok(self.current.is_some())
    }

    fn read_packet_data(&mut self, buf: &mut [u8]) -> YinliuResult<usize> {
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };
        let n = buf.len().min(current.len()).min(self.max_chunk);
        let chunk = current.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}
