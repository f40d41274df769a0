//! 输出阶段: 把合成区域中的样本按请求的布局与格式拷出.

use yinliu_core::SampleFormat;

use super::dsp::DspKernels;

/// 输出声道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// 按码流声道数输出, 立体声为 L,R 交错
    #[default]
    Native,
    /// 总是输出立体声, 单声道复制到左右两路
    Stereo,
}

impl OutputLayout {
    /// 每帧写入的采样数
    pub fn output_channels(self, stream_channels: usize) -> usize {
        match self {
            Self::Native => stream_channels,
            Self::Stereo => 2,
        }
    }
}

/// 可输出的采样类型
pub trait OutputSample: Copy + Default + Send + 'static {
    const FORMAT: SampleFormat;

    /// 把交错的浮点样本转换到 `dst`, 两者等长
    fn convert(src: &[f32], dst: &mut [Self], kernels: &DspKernels);
}

impl OutputSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::S16;

    fn convert(src: &[f32], dst: &mut [Self], kernels: &DspKernels) {
        (kernels.f32_to_s16)(src, dst);
    }
}

impl OutputSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    fn convert(src: &[f32], dst: &mut [Self], _kernels: &DspKernels) {
        dst.copy_from_slice(src);
    }
}

/// 把各声道从 `offset` 起的 `frames` 帧交错写入 `out`
///
/// `out` 会被清空重填, 长度为 `frames * layout.output_channels(channels.len())`.
pub(crate) fn interleave(
    channels: &[&[f32]],
    layout: OutputLayout,
    frames: usize,
    out: &mut Vec<f32>,
) {
    out.clear();
    match (channels, layout) {
        ([mono], OutputLayout::Native) => out.extend_from_slice(&mono[..frames]),
        ([mono], OutputLayout::Stereo) => {
            out.extend(mono[..frames].iter().flat_map(|&v| [v, v]));
        }
        ([left, right], _) => {
            out.extend(
                left[..frames]
                    .iter()
                    .zip(&right[..frames])
                    .flat_map(|(&l, &r)| [l, r]),
            );
        }
        _ => {
            let width = layout.output_channels(channels.len());
            out.resize(frames * width, 0.0);
            for (ch, samples) in channels.iter().enumerate().take(width) {
                for (frame, &v) in samples[..frames].iter().enumerate() {
                    out[frame * width + ch] = v;
                }
            }
        }
    }
}
