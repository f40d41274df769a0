//! 解码内层循环的函数指针策略.
//!
//! [`DspKernels::SCALAR`] 是按下标书写的参考实现; [`DspKernels::ZIPPED`] 用迭代器
//! 拼接消除边界检查, 便于编译器向量化. 两者逐位一致, 进程内只探测一次.

use std::fmt;
use std::sync::OnceLock;

use log::debug;

/// 内核选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelKind {
    /// 使用进程级探测结果
    #[default]
    Auto,
    Scalar,
    Zipped,
}

/// 一组内层循环实现
#[derive(Clone, Copy)]
pub struct DspKernels {
    pub name: &'static str,
    /// 加窗重叠相加: `cur` 为当前块中心两段 (长 2q), `prev` 为上一块保存的 q 个样本
    ///
    /// 完成后 `prev` 保存当前块的前 q 个样本.
    pub overlap_add: fn(cur: &mut [f32], prev: &mut [f32], window: &[f32]),
    /// 幅度/角度声道解耦
    pub decouple: fn(magnitude: &mut [f32], angle: &mut [f32]),
    /// 把 L,R 交织的序列拆成两个声道
    pub deinterleave2: fn(src: &[f32], left: &mut [f32], right: &mut [f32]),
    /// 钳制到 [-1, 1] 后按 32767 缩放并取整
    pub f32_to_s16: fn(src: &[f32], dst: &mut [i16]),
}

impl fmt::Debug for DspKernels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspKernels").field("name", &self.name).finish()
    }
}

static DETECTED: OnceLock<&'static DspKernels> = OnceLock::new();

impl DspKernels {
    pub const SCALAR: DspKernels = DspKernels {
        name: "scalar",
        overlap_add: overlap_add_scalar,
        decouple: decouple_scalar,
        deinterleave2: deinterleave2_scalar,
        f32_to_s16: f32_to_s16_scalar,
    };

    pub const ZIPPED: DspKernels = DspKernels {
        name: "zipped",
        overlap_add: overlap_add_zipped,
        decouple: decouple_zipped,
        deinterleave2: deinterleave2_zipped,
        f32_to_s16: f32_to_s16_zipped,
    };

    /// 按 CPU 能力选择一次, 之后所有解码器共用
    pub fn detect() -> &'static DspKernels {
        DETECTED.get_or_init(|| {
            let kernels: &'static DspKernels = if simd_capable() {
                &Self::ZIPPED
            } else {
                &Self::SCALAR
            };
            debug!("Vorbis DSP 内核: {}", kernels.name);
            kernels
        })
    }

    pub fn for_kind(kind: KernelKind) -> &'static DspKernels {
        match kind {
            KernelKind::Auto => Self::detect(),
            KernelKind::Scalar => &Self::SCALAR,
            KernelKind::Zipped => &Self::ZIPPED,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn simd_capable() -> bool {
    is_x86_feature_detected!("sse2")
}

#[cfg(target_arch = "aarch64")]
fn simd_capable() -> bool {
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn simd_capable() -> bool {
    false
}

#[inline]
fn to_s16(x: f32) -> i16 {
    // .5 远离零取整
    (x.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

#[inline]
fn decouple_pair(m: f32, a: f32) -> (f32, f32) {
    if m > 0.0 {
        if a > 0.0 { (m, m - a) } else { (m + a, m) }
    } else if a > 0.0 {
        (m, m + a)
    } else {
        (m - a, m)
    }
}

#[allow(clippy::needless_range_loop)]
fn overlap_add_scalar(cur: &mut [f32], prev: &mut [f32], window: &[f32]) {
    let n2 = prev.len();
    if n2 == 0 {
        return;
    }
    let nm1 = n2 * 2 - 1;
    for i in 0..n2 {
        let cur_nq1 = cur[nm1 - i];
        let prev_q3 = prev[i];
        let w_lo = window[i];
        let w_hi = window[nm1 - i];

        prev[i] = cur[i];
        cur[i] = prev_q3 * w_hi - cur_nq1 * w_lo;
        cur[nm1 - i] = prev_q3 * w_lo + cur_nq1 * w_hi;
    }
}

fn overlap_add_zipped(cur: &mut [f32], prev: &mut [f32], window: &[f32]) {
    let n2 = prev.len();
    let (head, tail) = cur[..2 * n2].split_at_mut(n2);
    let (w_lo, w_hi) = window[..2 * n2].split_at(n2);
    for ((((d, t), p), &wl), &wh) in head
        .iter_mut()
        .zip(tail.iter_mut().rev())
        .zip(prev.iter_mut())
        .zip(w_lo)
        .zip(w_hi.iter().rev())
    {
        let cur_nq1 = *t;
        let prev_q3 = *p;
        *p = *d;
        *d = prev_q3 * wh - cur_nq1 * wl;
        *t = prev_q3 * wl + cur_nq1 * wh;
    }
}

#[allow(clippy::needless_range_loop)]
fn decouple_scalar(magnitude: &mut [f32], angle: &mut [f32]) {
    let n = magnitude.len().min(angle.len());
    for i in 0..n {
        let (m, a) = decouple_pair(magnitude[i], angle[i]);
        magnitude[i] = m;
        angle[i] = a;
    }
}

fn decouple_zipped(magnitude: &mut [f32], angle: &mut [f32]) {
    for (m, a) in magnitude.iter_mut().zip(angle.iter_mut()) {
        (*m, *a) = decouple_pair(*m, *a);
    }
}

#[allow(clippy::needless_range_loop)]
fn deinterleave2_scalar(src: &[f32], left: &mut [f32], right: &mut [f32]) {
    let n = left.len().min(right.len()).min(src.len() / 2);
    for i in 0..n {
        left[i] = src[2 * i];
        right[i] = src[2 * i + 1];
    }
}

fn deinterleave2_zipped(src: &[f32], left: &mut [f32], right: &mut [f32]) {
    for (pair, (l, r)) in src.chunks_exact(2).zip(left.iter_mut().zip(right.iter_mut())) {
        *l = pair[0];
        *r = pair[1];
    }
}

#[allow(clippy::needless_range_loop)]
fn f32_to_s16_scalar(src: &[f32], dst: &mut [i16]) {
    let n = src.len().min(dst.len());
    for i in 0..n {
        dst[i] = to_s16(src[i]);
    }
}

fn f32_to_s16_zipped(src: &[f32], dst: &mut [i16]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = to_s16(s);
    }
}
