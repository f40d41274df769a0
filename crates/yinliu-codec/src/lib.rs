//! # yinliu-codec
//!
//! Ogg Vorbis I 解码核心: 头包解析、熵解码与矢量量化、floor 合成、residue 重建、
//! 声道解耦、IMDCT 与加窗重叠相加, 以及输出采样转换.
//!
//! 解码核心不关心容器格式, 只通过 [`PacketSource`] 按 packet 拉取字节.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use yinliu_codec::{MemoryPacketSource, OutputLayout, VorbisDecoder};
//!
//! # fn run(packets: Vec<Vec<u8>>) -> yinliu_core::YinliuResult<()> {
//! let mut decoder = VorbisDecoder::new(MemoryPacketSource::new(packets));
//! decoder.parse_headers()?;
//! let mut pcm = vec![0i16; 4096];
//! while decoder.decode_audio_packet()? {
//!     while decoder.samples_remaining() > 0 {
//!         decoder.read_samples(OutputLayout::Stereo, &mut pcm);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod packet;
pub mod vorbis;

// 重导出常用类型
pub use packet::{MemoryPacketSource, PacketSource};
pub use vorbis::{
    DirectImdct, DspKernels, FftImdct, ImdctKernel, KernelKind, OutputLayout, OutputSample,
    TransformKind, VorbisDecoder, VorbisDecoderOptions,
};
