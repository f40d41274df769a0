//! # yinliu (音流)
//!
//! 纯 Rust 实现的 Ogg Vorbis I 流式解码库.
//!
//! - **容器**: Ogg 页面同步、分段重组与 CRC 校验
//! - **解码**: 头包解析、floor/residue 重建、IMDCT 与重叠相加
//! - **输出**: 交错的 `i16` 或 `f32` PCM, 可选单声道转立体声
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use yinliu::codec::OutputLayout;
//!
//! # fn run() -> yinliu::core::YinliuResult<()> {
//! let file = std::fs::File::open("music.ogg")?;
//! let mut decoder = yinliu::open_ogg_vorbis(std::io::BufReader::new(file))?;
//! println!("{} Hz, {} 声道", decoder.sample_rate(), decoder.channel_count());
//!
//! let mut pcm = vec![0i16; 4096];
//! while decoder.decode_audio_packet()? {
//!     while decoder.samples_remaining() > 0 {
//!         let frames = decoder.read_samples(OutputLayout::Native, &mut pcm);
//!         // 处理 pcm[..frames * channels]
//!         let _ = frames;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `yinliu-core` | 错误类型、采样格式、声道布局、CRC 与位写入工具 |
//! | `yinliu-codec` | Vorbis 解码核心与 packet 来源抽象 |
//! | `yinliu-format` | Ogg 页面读取 |

use std::io::Read;

use yinliu_codec::{VorbisDecoder, VorbisDecoderOptions};
use yinliu_core::YinliuResult;
use yinliu_format::{OggPacketReader, OggReaderOptions};

/// 核心类型与工具
pub use yinliu_core as core;

/// Vorbis 解码核心
pub use yinliu_codec as codec;

/// Ogg 容器读取
pub use yinliu_format as format;

pub mod logging;

/// 获取 yinliu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 打开 Ogg Vorbis 字节流并解析三个头包
///
/// 返回的解码器已可直接调用 `decode_audio_packet`.
pub fn open_ogg_vorbis<R: Read>(reader: R) -> YinliuResult<VorbisDecoder<OggPacketReader<R>>> {
    open_ogg_vorbis_with(
        reader,
        OggReaderOptions::default(),
        VorbisDecoderOptions::default(),
    )
}

/// 同 [`open_ogg_vorbis`], 可指定容器与解码选项
pub fn open_ogg_vorbis_with<R: Read>(
    reader: R,
    ogg_options: OggReaderOptions,
    decoder_options: VorbisDecoderOptions,
) -> YinliuResult<VorbisDecoder<OggPacketReader<R>>> {
    let source = OggPacketReader::with_options(reader, ogg_options);
    let mut decoder = VorbisDecoder::with_options(source, decoder_options);
    decoder.parse_headers()?;
    Ok(decoder)
}
