//! Vorbis residue: 分区、分类的矢量量化残差解码.

use log::debug;
use yinliu_core::{CorruptKind, YinliuError, YinliuResult};

use super::bitreader::BitReader;
use super::codebook::{Codebook, VqBook};
use super::dsp::DspKernels;

const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResidueKind {
    /// 列优先交织
    Interleaved,
    /// 行优先, 分量连续
    Contiguous,
    /// 先按声道交织解码, 再拆回各声道
    ChannelInterleaved,
}

#[derive(Debug, Clone)]
pub(crate) struct Residue {
    kind: ResidueKind,
    begin: usize,
    end: usize,
    partition_size: usize,
    classifications: u32,
    classbook: u8,
    /// 每个分类在 8 个编码轮次上的 codebook
    books: Vec<[Option<u8>; MAX_PASSES]>,
}

/// residue 解码的复用缓冲
#[derive(Debug, Default)]
pub(crate) struct ResidueScratch {
    classes: Vec<Vec<u8>>,
    interleaved: Vec<f32>,
}

impl Residue {
    pub(crate) fn parse(br: &mut BitReader<'_>, codebooks: &[Codebook]) -> YinliuResult<Self> {
        let residue_type = br.read(16);
        let kind = match residue_type {
            0 => ResidueKind::Interleaved,
            1 => ResidueKind::Contiguous,
            2 => ResidueKind::ChannelInterleaved,
            _ => {
                return Err(YinliuError::Unsupported(format!(
                    "Vorbis residue_type 不支持: {residue_type}"
                )));
            }
        };

        let begin = br.read(24) as usize;
        let end = br.read(24) as usize;
        let partition_size = br.read(24) as usize + 1;
        let classifications = br.read(6) + 1;
        let classbook = br.read(8);

        let Some(book) = codebooks.get(classbook as usize) else {
            return Err(YinliuError::corrupt(
                CorruptKind::BadReference,
                format!("Vorbis residue classbook 越界: {classbook}"),
            ));
        };
        if book.dimensions() == 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                "Vorbis residue classbook 维度不能为 0",
            ));
        }
        if !pow_within(classifications, book.dimensions(), book.entries()) {
            return Err(YinliuError::corrupt(
                CorruptKind::InvalidField,
                format!(
                    "Vorbis residue 分类数超出 classbook 容量: classifications={classifications}, dim={}, entries={}",
                    book.dimensions(),
                    book.entries()
                ),
            ));
        }

        let cascades: Vec<u32> = (0..classifications)
            .map(|_| {
                let low = br.read(3);
                let high = if br.read_flag() { br.read(5) } else { 0 };
                (high << 3) | low
            })
            .collect();

        let mut books = Vec::with_capacity(cascades.len());
        for cascade in cascades {
            let mut passes = [None; MAX_PASSES];
            for (pass, slot) in passes.iter_mut().enumerate() {
                if cascade & (1 << pass) == 0 {
                    continue;
                }
                let raw = br.read(8);
                if raw as usize >= codebooks.len() {
                    return Err(YinliuError::corrupt(
                        CorruptKind::BadReference,
                        format!("Vorbis residue codebook 越界: {raw}"),
                    ));
                }
                *slot = Some(raw as u8);
            }
            books.push(passes);
        }

        Ok(Self {
            kind,
            begin,
            end,
            partition_size,
            classifications,
            classbook: classbook as u8,
            books,
        })
    }

    pub(crate) fn kind(&self) -> ResidueKind {
        self.kind
    }

    /// 解码一个 submap 的 residue, 结果累加到 `vectors` (每个长度为半块)
    ///
    /// 越过 packet 末尾时停止本次解码, 已累加的值保留.
    pub(crate) fn decode(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[Codebook],
        vectors: &mut [&mut [f32]],
        half: usize,
        scratch: &mut ResidueScratch,
        kernels: &DspKernels,
    ) -> YinliuResult<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        let interleaved = self.kind == ResidueKind::ChannelInterleaved;
        let size = if interleaved { half * vectors.len() } else { half };
        let end = self.end.min(size);
        // 必须截断
        let partitions = end.saturating_sub(self.begin) / self.partition_size;
        if partitions == 0 {
            return Ok(());
        }

        let classbook = &codebooks[usize::from(self.classbook)];
        let class_dim = classbook.dimensions();
        let class_vectors = if interleaved { 1 } else { vectors.len() };
        scratch.classes.resize_with(class_vectors, Vec::new);
        for classes in &mut scratch.classes[..class_vectors] {
            classes.clear();
            classes.resize(partitions.div_ceil(class_dim) * class_dim, 0);
        }
        if interleaved {
            scratch.interleaved.clear();
            scratch.interleaved.resize(size, 0.0);
        }

        let completed = self.decode_passes(br, codebooks, vectors, scratch, partitions)?;
        if !completed {
            debug!("Vorbis residue 解码在 packet 末尾截断");
        }

        if interleaved {
            match vectors {
                [left, right] => (kernels.deinterleave2)(&scratch.interleaved, left, right),
                [mono] => mono.copy_from_slice(&scratch.interleaved[..half]),
                _ => {}
            }
        }
        Ok(())
    }

    /// 返回 false 表示遇到 packet 末尾
    fn decode_passes(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[Codebook],
        vectors: &mut [&mut [f32]],
        scratch: &mut ResidueScratch,
        partitions: usize,
    ) -> YinliuResult<bool> {
        let classbook = &codebooks[usize::from(self.classbook)];
        let class_dim = classbook.dimensions();
        let interleaved = self.kind == ResidueKind::ChannelInterleaved;
        let psize = self.partition_size;

        for pass in 0..MAX_PASSES {
            let mut partition = 0usize;
            let mut class_index = 0usize;
            while partition < partitions {
                if pass == 0 {
                    for classes in scratch.classes.iter_mut().take(if interleaved { 1 } else { vectors.len() }) {
                        let mut classv = classbook.decode_index(br);
                        if br.is_eop() {
                            return Ok(false);
                        }
                        for d in (0..class_dim).rev() {
                            classes[class_index + d] = (classv % self.classifications) as u8;
                            classv /= self.classifications;
                        }
                    }
                    class_index += class_dim;
                }

                for _ in 0..class_dim {
                    if partition >= partitions {
                        break;
                    }
                    let offset = self.begin + partition * psize;
                    if interleaved {
                        let class = scratch.classes[0][partition];
                        if let Some(vq) = self.pass_book(codebooks, class, pass)? {
                            let dst = &mut scratch.interleaved[offset..offset + psize];
                            if !decode_contiguous(vq, br, dst) {
                                return Ok(false);
                            }
                        }
                    } else {
                        for (v, vector) in vectors.iter_mut().enumerate() {
                            let class = scratch.classes[v][partition];
                            let Some(vq) = self.pass_book(codebooks, class, pass)? else {
                                continue;
                            };
                            let dst = &mut vector[offset..offset + psize];
                            let ok = match self.kind {
                                ResidueKind::Interleaved => decode_strided(vq, br, dst),
                                _ => decode_contiguous(vq, br, dst),
                            };
                            if !ok {
                                return Ok(false);
                            }
                        }
                    }
                    partition += 1;
                }
            }
        }
        Ok(true)
    }

    fn pass_book<'a>(
        &self,
        codebooks: &'a [Codebook],
        class: u8,
        pass: usize,
    ) -> YinliuResult<Option<VqBook<'a>>> {
        let Some(book) = self.books[usize::from(class)][pass] else {
            return Ok(None);
        };
        let vq = codebooks[usize::from(book)].vq()?;
        if self.partition_size % vq.dimensions() != 0 {
            return Err(YinliuError::corrupt(
                CorruptKind::PartitionSize,
                format!(
                    "Vorbis residue 分区大小 {} 不是 codebook 维度 {} 的整数倍",
                    self.partition_size,
                    vq.dimensions()
                ),
            ));
        }
        Ok(Some(vq))
    }
}

/// 分量连续写入, 返回 false 表示遇到 packet 末尾
fn decode_contiguous(vq: VqBook<'_>, br: &mut BitReader<'_>, dst: &mut [f32]) -> bool {
    for chunk in dst.chunks_exact_mut(vq.dimensions()) {
        let values = vq.decode(br);
        if br.is_eop() {
            return false;
        }
        for (d, &v) in chunk.iter_mut().zip(values) {
            *d += v;
        }
    }
    true
}

/// 第 j 个分量写到步长为 `dst.len() / dim` 的位置
fn decode_strided(vq: VqBook<'_>, br: &mut BitReader<'_>, dst: &mut [f32]) -> bool {
    let steps = dst.len() / vq.dimensions();
    for i in 0..steps {
        let values = vq.decode(br);
        if br.is_eop() {
            return false;
        }
        for (j, &v) in values.iter().enumerate() {
            dst[i + j * steps] += v;
        }
    }
    true
}

/// base^exp <= limit, 平方乘且不溢出
fn pow_within(base: u32, exp: usize, limit: u32) -> bool {
    let limit = u64::from(limit);
    let mut result = 1u64;
    let mut b = u64::from(base);
    let mut e = exp;
    while e > 0 {
        if e & 1 != 0 {
            result *= b;
            if result > limit {
                return false;
            }
        }
        e >>= 1;
        if e > 0 {
            b = b.saturating_mul(b).min(limit + 1);
        }
    }
    result <= limit
}
