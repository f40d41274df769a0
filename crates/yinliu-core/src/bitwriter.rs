//! 比特流写入器.
//!
//! 按小端位序写入 (LSB first), 与 Vorbis 解码端的位读取顺序对应.
//! 主要用于在测试与基准中合成头包和音频包.

/// LSB 优先比特流写入器
///
/// # 示例
/// ```
/// use yinliu_core::bitwriter::LsbBitWriter;
///
/// let mut bw = LsbBitWriter::new();
/// bw.write_bits(0b010, 3);
/// bw.write_bits(0b10110, 5);
/// assert_eq!(bw.finish(), vec![0b1011_0010]);
/// ```
pub struct LsbBitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充, 从低位开始)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl LsbBitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: bool) {
        self.current_byte |= u8::from(bit) << self.bit_count;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 低位在前.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        let mut value = value;
        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - u32::from(self.bit_count);
            let to_write = remaining.min(available);
            let bits = (value & ((1u32 << to_write) - 1)) as u8;
            self.current_byte |= bits << self.bit_count;
            self.bit_count += to_write as u8;
            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }
            value >>= to_write;
            remaining -= to_write;
        }
    }

    /// 写入 N 个位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        if n <= 32 {
            self.write_bits(value as u32, n);
        } else {
            self.write_bits(value as u32, 32);
            self.write_bits((value >> 32) as u32, n - 32);
        }
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 对齐到字节边界 (高位用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

impl Default for LsbBitWriter {
    fn default() -> Self {
        Self::new()
    }
}
