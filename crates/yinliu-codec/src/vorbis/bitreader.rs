use yinliu_core::{YinliuError, YinliuResult};

use crate::packet::PacketSource;

/// 单次从 packet 来源拉取的最大字节数
const CHUNK_LEN: usize = 256;

/// LSB 优先位读取器
///
/// 从 [`PacketSource`] 按块拉取当前 packet 的字节. 读过 packet 末尾时返回零填充的位,
/// 并置位 EOP 标志, 由调用方决定按静音处理还是按致命错误处理.
/// 来源返回的 I/O 错误同样按 EOP 处理, 并暂存到 [`BitReader::finish`] 时返回.
pub(crate) struct BitReader<'a> {
    source: &'a mut dyn PacketSource,
    chunk: [u8; CHUNK_LEN],
    chunk_len: usize,
    chunk_pos: usize,
    acc: u64,
    acc_bits: u32,
    source_done: bool,
    overrun: bool,
    bits_consumed: u64,
    error: Option<YinliuError>,
}

impl<'a> BitReader<'a> {
    /// 在已经 `next_packet` 的来源上创建读取器
    pub(crate) fn new(source: &'a mut dyn PacketSource) -> Self {
        Self {
            source,
            chunk: [0; CHUNK_LEN],
            chunk_len: 0,
            chunk_pos: 0,
            acc: 0,
            acc_bits: 0,
            source_done: false,
            overrun: false,
            bits_consumed: 0,
            error: None,
        }
    }

    fn fetch_chunk(&mut self) {
        match self.source.read_packet_data(&mut self.chunk) {
            Ok(0) => self.source_done = true,
            Ok(n) => {
                self.chunk_len = n.min(CHUNK_LEN);
                self.chunk_pos = 0;
            }
            Err(e) => {
                self.error = Some(e);
                self.source_done = true;
            }
        }
    }

    fn refill(&mut self) {
        while self.acc_bits <= 56 {
            if self.chunk_pos >= self.chunk_len {
                if self.source_done {
                    break;
                }
                self.fetch_chunk();
                continue;
            }
            self.acc |= u64::from(self.chunk[self.chunk_pos]) << self.acc_bits;
            self.chunk_pos += 1;
            self.acc_bits += 8;
        }
    }

    /// 读取 n 位 (0..=32)
    pub(crate) fn read(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32, "BitReader::read 位数非法: {n}");
        if n == 0 {
            return 0;
        }
        if self.acc_bits < n {
            self.refill();
        }
        let v = self.acc & ((1u64 << n) - 1);
        self.consume(n);
        v as u32
    }

    /// 读取 n 位 (0..=64)
    pub(crate) fn read_u64(&mut self, n: u32) -> u64 {
        if n <= 32 {
            return u64::from(self.read(n));
        }
        let lo = u64::from(self.read(32));
        let hi = u64::from(self.read(n - 32));
        lo | (hi << 32)
    }

    pub(crate) fn read_flag(&mut self) -> bool {
        self.read(1) != 0
    }

    /// 读取 Vorbis 打包浮点数
    pub(crate) fn read_float(&mut self) -> f32 {
        float32_unpack(self.read(32))
    }

    /// 预取 32 位而不消费, 超出 packet 的部分为零
    pub(crate) fn peek32(&mut self) -> u32 {
        if self.acc_bits < 32 {
            self.refill();
        }
        self.acc as u32
    }

    /// 消费 n 位 (0..=32)
    pub(crate) fn consume(&mut self, n: u32) {
        if n > self.acc_bits {
            self.overrun = true;
            self.acc = 0;
            self.acc_bits = 0;
        } else {
            self.acc >>= n;
            self.acc_bits -= n;
        }
        self.bits_consumed += u64::from(n);
    }

    /// 之前的读取是否越过了 packet 末尾 (置位后保持)
    pub(crate) fn is_eop(&self) -> bool {
        self.overrun
    }

    /// 已消费的位数, 用于诊断信息
    pub(crate) fn bit_position(&self) -> u64 {
        self.bits_consumed
    }

    /// 结束读取, 返回来源暂存的错误
    pub(crate) fn finish(self) -> YinliuResult<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 解包 Vorbis 32 位浮点格式: 21 位尾数, 10 位指数 (偏置 788), 1 位符号
///
/// 指数限制在偏置的 ±63 范围内.
pub(crate) fn float32_unpack(x: u32) -> f32 {
    let mantissa = (x & 0x1f_ffff) as f32;
    let exponent = ((x >> 21) & 0x3ff) as i32 - 768;
    let exponent = exponent.clamp(-63, 63) - 20;
    let value = mantissa * 2f32.powi(exponent);
    if x & 0x8000_0000 != 0 { -value } else { value }
}

/// 表示 v 所需的位数 (ilog(0) = 0)
pub(crate) fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}
