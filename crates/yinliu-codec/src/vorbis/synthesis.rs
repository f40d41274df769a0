//! 时域合成: 逆变换后的半块与上一块保存的尾部做加窗重叠相加.
//!
//! 每个声道的块缓冲长度为长块的一半, 当前块的 `[Q3 | Q2]` 以缓冲中点为中心存放,
//! 这样长短块切换时逆变换和重叠相加都不需要搬移数据. 重叠缓冲保存上一块的 Q3,
//! 长度为长块的四分之一, 右对齐.

use std::f64::consts::FRAC_PI_2;
use std::ops::Range;

use super::dsp::DspKernels;

/// 块长为 `block_size` 的上升半窗, 长度 `block_size / 2`
pub(crate) fn vorbis_window(block_size: usize) -> Vec<f32> {
    let n = block_size as f64;
    (0..block_size / 2)
        .map(|i| {
            let s = ((i as f64 + 0.5) * std::f64::consts::PI / n).sin();
            (FRAC_PI_2 * s * s).sin() as f32
        })
        .collect()
}

/// 单声道块缓冲
#[derive(Debug, Clone)]
pub(crate) struct BlockBuffer {
    data: Vec<f32>,
}

impl BlockBuffer {
    pub(crate) fn new(long_half: usize) -> Self {
        Self {
            data: vec![0.0; long_half],
        }
    }

    fn mid(&self) -> usize {
        self.data.len() / 2
    }

    /// 本 packet 的频谱/时域区域, 长度为当前半块
    pub(crate) fn active_mut(&mut self, half: usize) -> &mut [f32] {
        let mid = self.mid();
        &mut self.data[mid - half / 2..mid + half / 2]
    }

    pub(crate) fn samples(&self, range: Range<usize>) -> &[f32] {
        &self.data[range]
    }
}

/// 一次合成产出的样本位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct OutputSpan {
    pub(crate) start: usize,
    pub(crate) len: usize,
}

/// 重叠相加状态机
///
/// 第一个块没有可重叠的上一块, 只保存尾部不输出.
#[derive(Debug, Clone)]
pub(crate) struct Synthesizer {
    short_half: usize,
    long_half: usize,
    short_window: Vec<f32>,
    long_window: Vec<f32>,
    overlaps: Vec<Vec<f32>>,
    drop_first: bool,
    prev_long: bool,
}

impl Synthesizer {
    pub(crate) fn new(channels: usize, short_size: usize, long_size: usize) -> Self {
        let long_half = long_size / 2;
        Self {
            short_half: short_size / 2,
            long_half,
            short_window: vorbis_window(short_size),
            long_window: vorbis_window(long_size),
            overlaps: vec![vec![0.0; long_half / 2]; channels],
            drop_first: true,
            prev_long: false,
        }
    }

    pub(crate) fn half_size(&self, long: bool) -> usize {
        if long { self.long_half } else { self.short_half }
    }

    /// 合成一个块, `buffers` 的活动区域已是逆变换结果
    pub(crate) fn overlap(
        &mut self,
        buffers: &mut [BlockBuffer],
        long: bool,
        kernels: &DspKernels,
    ) -> OutputSpan {
        let half = self.half_size(long);
        let prev_half = self.half_size(self.prev_long);
        let mid = self.long_half / 2;
        let ov_end = self.long_half / 2;

        if self.drop_first {
            for (buf, ov) in buffers.iter_mut().zip(&mut self.overlaps) {
                ov[ov_end - half / 2..].copy_from_slice(&buf.data[mid - half / 2..mid]);
            }
            self.drop_first = false;
            self.prev_long = long;
            return OutputSpan {
                start: mid,
                len: 0,
            };
        }

        let qw = half.min(prev_half) / 2;
        let window = if long && self.prev_long {
            &self.long_window
        } else {
            &self.short_window
        };

        for (buf, ov) in buffers.iter_mut().zip(&mut self.overlaps) {
            // 长块接短块: 上一块多出的尾部已是最终样本
            if prev_half > half {
                let len = (prev_half - half) / 2;
                let src = ov_end - prev_half / 2;
                let dst = mid - prev_half / 2;
                buf.data[dst..dst + len].copy_from_slice(&ov[src..src + len]);
            }

            (kernels.overlap_add)(
                &mut buf.data[mid - qw..mid + qw],
                &mut ov[ov_end - qw..],
                &window[..2 * qw],
            );

            // 短块接长块: 当前块多出的部分留给下一块
            if half > prev_half {
                let len = (half - prev_half) / 2;
                let src = mid - half / 2;
                let dst = ov_end - half / 2;
                ov[dst..dst + len].copy_from_slice(&buf.data[src..src + len]);
            }
        }

        self.prev_long = long;
        OutputSpan {
            start: mid - prev_half / 2,
            len: (half + prev_half) / 2,
        }
    }
}
