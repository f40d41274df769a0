//! 逆 MDCT 内核.
//!
//! 输入 n 个频谱系数, 原地输出完整 2n 点时域块的第三、第二个四分之一 (各 n/2 点,
//! 顺序为 `[Q3 | Q2]`), 不做缩放. 其余两个四分之一由对称性在重叠相加时重建.

use std::f64::consts::PI;

/// 逆变换内核选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformKind {
    /// 默认使用 FFT 内核
    #[default]
    Auto,
    Fft,
    /// O(n²) 的直接求和, 作为参考实现
    Direct,
}

/// 原地逆 MDCT
pub trait ImdctKernel {
    /// 频谱系数个数 (半块长度)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `buf.len()` 必须等于 [`ImdctKernel::len`]
    fn transform(&mut self, buf: &mut [f32]);
}

pub(crate) fn build_kernel(kind: TransformKind, n: usize) -> Box<dyn ImdctKernel + Send> {
    match kind {
        TransformKind::Direct => Box::new(DirectImdct::new(n)),
        TransformKind::Auto | TransformKind::Fft => Box::new(FftImdct::new(n)),
    }
}

/// 直接按余弦求和, f64 累加
#[derive(Debug, Clone)]
pub struct DirectImdct {
    n: usize,
    input: Vec<f64>,
}

impl DirectImdct {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            input: vec![0.0; n],
        }
    }
}

impl ImdctKernel for DirectImdct {
    fn len(&self) -> usize {
        self.n
    }

    fn transform(&mut self, buf: &mut [f32]) {
        let n = self.n;
        debug_assert_eq!(buf.len(), n);
        for (dst, &src) in self.input.iter_mut().zip(buf.iter()) {
            *dst = f64::from(src);
        }

        let half = n as f64 / 2.0;
        for (k, out) in buf.iter_mut().enumerate() {
            // Q3 对应 y[n..3n/2), Q2 对应 y[n/2..n)
            let m = if k < n / 2 { n + k } else { k };
            let phase = m as f64 + 0.5 + half;
            let sum: f64 = self
                .input
                .iter()
                .enumerate()
                .map(|(j, &x)| x * (PI / n as f64 * phase * (j as f64 + 0.5)).cos())
                .sum();
            *out = sum as f32;
        }
    }
}

/// 经 n/2 点复数 FFT 计算的 DCT-IV, 再按对称性排成 `[Q3 | Q2]`
#[derive(Debug, Clone)]
pub struct FftImdct {
    n: usize,
    pre_twiddle: Vec<(f32, f32)>,
    post_twiddle: Vec<(f32, f32)>,
    fft_twiddle: Vec<(f32, f32)>,
    bit_reverse: Vec<u32>,
    work: Vec<(f32, f32)>,
}

fn unit(angle: f64) -> (f32, f32) {
    (angle.cos() as f32, angle.sin() as f32)
}

#[inline]
fn cmul(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

impl FftImdct {
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 2);
        let m = n / 2;
        let nf = n as f64;
        let pre_twiddle = (0..m)
            .map(|t| unit(-PI * (4 * t + 1) as f64 / (4.0 * nf)))
            .collect();
        let post_twiddle = (0..m).map(|s| unit(-PI * s as f64 / nf)).collect();
        let fft_twiddle = (0..m / 2)
            .map(|k| unit(-2.0 * PI * k as f64 / m as f64))
            .collect();
        let bits = m.trailing_zeros();
        let bit_reverse = (0..m as u32)
            .map(|i| if bits == 0 { 0 } else { i.reverse_bits() >> (32 - bits) })
            .collect();
        Self {
            n,
            pre_twiddle,
            post_twiddle,
            fft_twiddle,
            bit_reverse,
            work: vec![(0.0, 0.0); m],
        }
    }

    /// 原地迭代 radix-2 FFT, 输入已按位反转排列
    fn fft(&mut self) {
        let m = self.work.len();
        let mut size = 2;
        while size <= m {
            let half = size / 2;
            let step = m / size;
            for block in self.work.chunks_exact_mut(size) {
                let (lo, hi) = block.split_at_mut(half);
                for (k, (a, b)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                    let t = cmul(*b, self.fft_twiddle[k * step]);
                    *b = (a.0 - t.0, a.1 - t.1);
                    *a = (a.0 + t.0, a.1 + t.1);
                }
            }
            size *= 2;
        }
    }
}

impl ImdctKernel for FftImdct {
    fn len(&self) -> usize {
        self.n
    }

    fn transform(&mut self, buf: &mut [f32]) {
        let n = self.n;
        let m = n / 2;
        debug_assert_eq!(buf.len(), n);

        for t in 0..m {
            let c = (buf[2 * t], buf[n - 1 - 2 * t]);
            self.work[self.bit_reverse[t] as usize] = cmul(c, self.pre_twiddle[t]);
        }

        self.fft();

        // u[2s] = Re, u[n-1-2s] = -Im; 输出取负并反转到两个四分之一
        let place = |j: usize| if j < m { m - 1 - j } else { 3 * m - 1 - j };
        for s in 0..m {
            let y = cmul(self.work[s], self.post_twiddle[s]);
            buf[place(2 * s)] = -y.0;
            buf[place(n - 1 - 2 * s)] = y.1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| ((i * 37 % 101) as f32 / 50.0 - 1.0) / (1.0 + i as f32 * 0.05))
            .collect()
    }

    #[test]
    fn test_fft内核与直接求和一致() {
        for n in [4usize, 32, 128, 1024] {
            let input = spectrum(n);
            let mut a = input.clone();
            let mut b = input.clone();
            DirectImdct::new(n).transform(&mut a);
            FftImdct::new(n).transform(&mut b);
            let peak = a.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
            for (i, (x, y)) in a.iter().zip(&b).enumerate() {
                assert!(
                    (x - y).abs() <= 1e-4 * peak.max(1.0),
                    "n={n}, i={i}: direct={x}, fft={y}"
                );
            }
        }
    }

    #[test]
    fn test_单一系数的余弦输出() {
        let n = 16;
        let mut buf = vec![0.0f32; n];
        buf[0] = 1.0;
        let mut kernel = FftImdct::new(n);
        kernel.transform(&mut buf);
        for (k, &v) in buf.iter().enumerate() {
            let m = if k < n / 2 { n + k } else { k };
            let expected =
                (PI / n as f64 * (m as f64 + 0.5 + n as f64 / 2.0) * 0.5).cos() as f32;
            assert!((v - expected).abs() < 1e-5, "k={k}: {v} vs {expected}");
        }
    }

    #[test]
    fn test_build_kernel() {
        assert_eq!(build_kernel(TransformKind::Auto, 128).len(), 128);
        assert_eq!(build_kernel(TransformKind::Direct, 64).len(), 64);
        assert!(!build_kernel(TransformKind::Fft, 32).is_empty());
    }
}
