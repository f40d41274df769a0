//! Vorbis codebook: 规范 Huffman 解码表与可选的 VQ 取值表.
//!
//! codebook 在 setup 解析时一次性构建, 之后只读. 短码字通过 10 位直查表解码,
//! 其余码字在按左对齐码值排序的表上二分查找.

use yinliu_core::{CorruptKind, YinliuError, YinliuResult};

use super::bitreader::{BitReader, ilog};

const QUICK_BITS: u32 = 10;
const QUICK_SIZE: usize = 1 << QUICK_BITS;
/// 直查表的取值以 u16 存储, 超过该条目数的 codebook 不建直查表
const QUICK_MAX_ENTRIES: u32 = 65534;
/// entries × max(dim, 1) 的上限
const MAX_CODEBOOK_VALUES: u64 = 0x10_0000;
const CODEBOOK_SYNC: u32 = 0x564342;

#[derive(Debug, Clone, Copy, Default)]
struct QuickEntry {
    value: u16,
    /// 0 表示需要走二分查找
    len: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Codebook {
    dimensions: usize,
    entries: u32,
    /// 左对齐的码字, 升序
    codewords: Vec<u32>,
    values: Vec<u32>,
    lengths: Vec<u8>,
    quick: Option<Box<[QuickEntry]>>,
    quick_only: bool,
    vq: Option<Vec<f32>>,
}

impl Codebook {
    /// 从 setup 位流解析一个 codebook
    pub(crate) fn parse(br: &mut BitReader<'_>) -> YinliuResult<Self> {
        let sync = br.read(24);
        if sync != CODEBOOK_SYNC {
            return Err(YinliuError::corrupt(
                CorruptKind::Signature,
                format!("Vorbis codebook 同步字错误: 0x{sync:06X}"),
            ));
        }

        let dimensions = br.read(16);
        let entries = br.read(24);
        if entries == 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                "Vorbis codebook entries 不能为 0",
            ));
        }
        if u64::from(dimensions.max(1)) * u64::from(entries) >= MAX_CODEBOOK_VALUES {
            return Err(YinliuError::corrupt(
                CorruptKind::LimitExceeded,
                format!("Vorbis codebook 过大: dimensions={dimensions}, entries={entries}"),
            ));
        }

        let lengths = read_lengths(br, entries)?;
        if br.is_eop() {
            return Err(YinliuError::corrupt(
                CorruptKind::TruncatedHeader,
                "Vorbis codebook 码长表不完整",
            ));
        }
        let mut book = Self::from_lengths(dimensions, &lengths)?;

        let lookup_type = br.read(4);
        match lookup_type {
            0 => {}
            1 | 2 => {
                if dimensions == 0 {
                    return Err(YinliuError::corrupt(
                        CorruptKind::InvalidField,
                        "Vorbis VQ codebook 维度不能为 0",
                    ));
                }
                let minimum = br.read_float();
                let delta = br.read_float();
                let value_bits = br.read(4) + 1;
                let sequence_p = br.read_flag();
                let dims = dimensions as usize;
                let table = if lookup_type == 1 {
                    let count = lookup1_values(entries, dimensions);
                    let multiplicands: Vec<f32> = (0..count)
                        .map(|_| br.read(value_bits) as f32 * delta + minimum)
                        .collect();
                    build_lattice_table(entries as usize, dims, &multiplicands, sequence_p)
                } else {
                    let mut table = Vec::with_capacity(entries as usize * dims);
                    for _ in 0..entries {
                        let mut last = 0.0f32;
                        for _ in 0..dims {
                            let v = br.read(value_bits) as f32 * delta + minimum + last;
                            table.push(v);
                            if sequence_p {
                                last = v;
                            }
                        }
                    }
                    table
                };
                book.vq = Some(table);
            }
            _ => {
                return Err(YinliuError::Unsupported(format!(
                    "Vorbis codebook lookup_type 不支持: {lookup_type}"
                )));
            }
        }

        if br.is_eop() {
            return Err(YinliuError::corrupt(
                CorruptKind::TruncatedHeader,
                "Vorbis codebook VQ 表不完整",
            ));
        }
        Ok(book)
    }

    /// 由码长表构建 Huffman 部分, 码长 0 表示未使用的条目
    pub(crate) fn from_lengths(dimensions: u32, lengths: &[u8]) -> YinliuResult<Self> {
        let entries = lengths.len() as u32;
        let (codewords, values, code_lengths) = if entries == 1 {
            if lengths[0] != 1 {
                return Err(YinliuError::corrupt(
                    CorruptKind::HuffmanTree,
                    "Vorbis 单项 codebook 的码长必须为 1",
                ));
            }
            (vec![0u32], vec![0u32], vec![1u8])
        } else {
            let assigned = assign_codewords(lengths)?;
            let mut codewords = Vec::with_capacity(assigned.len());
            let mut values = Vec::with_capacity(assigned.len());
            let mut code_lengths = Vec::with_capacity(assigned.len());
            for (code, entry) in assigned {
                codewords.push(code);
                values.push(entry);
                code_lengths.push(lengths[entry as usize]);
            }
            (codewords, values, code_lengths)
        };

        let quick_only =
            entries <= QUICK_MAX_ENTRIES && code_lengths.iter().all(|&l| u32::from(l) <= QUICK_BITS);
        let quick = (entries <= QUICK_MAX_ENTRIES).then(|| {
            let mut table = vec![QuickEntry::default(); QUICK_SIZE].into_boxed_slice();
            if entries == 1 {
                table.fill(QuickEntry { value: 0, len: 1 });
            } else {
                for ((&code, &value), &len) in codewords.iter().zip(&values).zip(&code_lengths) {
                    if u32::from(len) > QUICK_BITS {
                        continue;
                    }
                    let entry = QuickEntry {
                        value: value as u16,
                        len,
                    };
                    let start = code.reverse_bits() as usize;
                    for slot in table.iter_mut().skip(start).step_by(1 << len) {
                        *slot = entry;
                    }
                }
            }
            table
        });

        Ok(Self {
            dimensions: dimensions as usize,
            entries,
            codewords,
            values,
            lengths: code_lengths,
            quick,
            quick_only,
            vq: None,
        })
    }

    pub(crate) fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn entries(&self) -> u32 {
        self.entries
    }

    /// 所有码字都能通过直查表解码
    #[cfg(test)]
    pub(crate) fn is_quick_only(&self) -> bool {
        self.quick_only
    }

    /// 解码一个条目索引
    ///
    /// 越过 packet 末尾时返回零填充位对应的条目, EOP 由读取器记录.
    pub(crate) fn decode_index(&self, br: &mut BitReader<'_>) -> u32 {
        let bits = br.peek32();
        if let Some(quick) = &self.quick {
            let e = quick[bits as usize & (QUICK_SIZE - 1)];
            if e.len != 0 {
                br.consume(u32::from(e.len));
                return u32::from(e.value);
            }
        }

        debug_assert!(!self.quick_only, "直查表应覆盖全部码字");
        let key = bits.reverse_bits();
        let i = self
            .codewords
            .partition_point(|&c| c <= key)
            .saturating_sub(1);
        br.consume(u32::from(self.lengths[i]));
        self.values[i]
    }

    /// 以 VQ 方式使用该 codebook, 没有 VQ 表时报错
    pub(crate) fn vq(&self) -> YinliuResult<VqBook<'_>> {
        match &self.vq {
            Some(table) => Ok(VqBook { book: self, table }),
            None => Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                "Vorbis codebook 没有 VQ 表, 不能用于矢量解码",
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_vq(mut self, table: Vec<f32>) -> Self {
        self.vq = Some(table);
        self
    }

    /// (条目, 左对齐码字, 码长), 按码字排序
    #[cfg(test)]
    pub(crate) fn code_table(&self) -> impl Iterator<Item = (u32, u32, u8)> + '_ {
        self.values
            .iter()
            .zip(&self.codewords)
            .zip(&self.lengths)
            .map(|((&v, &c), &l)| (v, c, l))
    }
}

/// 已确认带 VQ 表的 codebook 视图
#[derive(Clone, Copy)]
pub(crate) struct VqBook<'a> {
    book: &'a Codebook,
    table: &'a [f32],
}

impl<'a> VqBook<'a> {
    pub(crate) fn dimensions(&self) -> usize {
        self.book.dimensions
    }

    /// 解码一个条目并返回其 D 维取值
    pub(crate) fn decode(&self, br: &mut BitReader<'_>) -> &'a [f32] {
        let dims = self.book.dimensions;
        let index = self.book.decode_index(br) as usize;
        &self.table[index * dims..(index + 1) * dims]
    }
}

fn read_lengths(br: &mut BitReader<'_>, entries: u32) -> YinliuResult<Vec<u8>> {
    let mut lengths = vec![0u8; entries as usize];
    if !br.read_flag() {
        let sparse = br.read_flag();
        for len in lengths.iter_mut() {
            if !sparse || br.read_flag() {
                *len = (br.read(5) + 1) as u8;
            }
        }
        return Ok(lengths);
    }

    // ordered: 按码长递增的游程
    let mut index = 0u32;
    let mut current_length = br.read(5) + 1;
    while index < entries {
        if current_length > 32 {
            return Err(YinliuError::corrupt(
                CorruptKind::HuffmanTree,
                "Vorbis ordered codebook 码长超过 32",
            ));
        }
        let left = entries - index;
        let run = br.read(ilog(left));
        if run > left {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                format!("Vorbis ordered codebook 游程越界: run={run}, left={left}"),
            ));
        }
        lengths[index as usize..(index + run) as usize].fill(current_length as u8);
        index += run;
        current_length += 1;
    }
    Ok(lengths)
}

/// 规范 Huffman 码字分配
///
/// 按条目顺序分配码字, `next_code[l]` 记录长度 l+1 上下一个可用的分裂点.
/// 返回按码字排序的 (左对齐码字, 条目).
fn assign_codewords(lengths: &[u8]) -> YinliuResult<Vec<(u32, u32)>> {
    let mut next_code = [0u32; 32];
    let Some(first) = lengths.iter().position(|&l| l != 0) else {
        return Err(YinliuError::corrupt(
            CorruptKind::HuffmanTree,
            "Vorbis codebook 没有任何已使用的条目",
        ));
    };

    for (j, slot) in next_code.iter_mut().enumerate().take(usize::from(lengths[first])) {
        *slot = 0x8000_0000 >> j;
    }

    let mut assigned = Vec::with_capacity(lengths.len());
    assigned.push((0u32, first as u32));

    for (entry, &len) in lengths.iter().enumerate().skip(first + 1) {
        if len == 0 {
            continue;
        }
        let target = usize::from(len - 1);

        // 向上寻找最近的可用分裂点
        let mut depth = target;
        while next_code[depth] == 0 {
            if depth == 0 {
                return Err(YinliuError::corrupt(
                    CorruptKind::HuffmanTree,
                    "Vorbis codebook Huffman 长度表过度指定",
                ));
            }
            depth -= 1;
        }

        let code = next_code[depth];
        next_code[depth] = 0;
        assigned.push((code, entry as u32));

        while depth < target {
            depth += 1;
            next_code[depth] = code + (0x8000_0000 >> depth);
        }
    }

    if next_code.iter().any(|&c| c != 0) {
        return Err(YinliuError::corrupt(
            CorruptKind::HuffmanTree,
            "Vorbis codebook Huffman 长度表欠指定",
        ));
    }

    assigned.sort_unstable();
    Ok(assigned)
}

/// lattice 查找表: 条目索引按 multiplicand 个数做进制拆分
fn build_lattice_table(
    entries: usize,
    dims: usize,
    multiplicands: &[f32],
    sequence_p: bool,
) -> Vec<f32> {
    let base = multiplicands.len().max(1);
    let mut table = Vec::with_capacity(entries * dims);
    for entry in 0..entries {
        let mut last = 0.0f32;
        let mut index = entry;
        for _ in 0..dims {
            let v = multiplicands.get(index % base).copied().unwrap_or(0.0) + last;
            index /= base;
            table.push(v);
            if sequence_p {
                last = v;
            }
        }
    }
    table
}

/// 满足 M^dimensions <= entries 的最大 M
fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }

    let mut lo = 1u32;
    let mut hi = entries;
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if pow_le_entries(mid, dimensions, entries) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn pow_le_entries(base: u32, exp: u32, entries: u32) -> bool {
    if base == 1 {
        return true;
    }
    let mut out = 1u64;
    for _ in 0..exp {
        out *= u64::from(base);
        if out > u64::from(entries) {
            return false;
        }
    }
    true
}
