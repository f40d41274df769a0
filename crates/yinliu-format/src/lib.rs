//! # yinliu-format
//!
//! Ogg 容器层: 把字节流切分为 packet, 供 [`yinliu_codec::VorbisDecoder`] 拉取.
//!
//! 只处理单个逻辑流, 不做 seek.

pub mod ogg;

pub use ogg::{OggPacketReader, OggReaderOptions};
