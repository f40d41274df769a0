//! # yinliu-core
//!
//! yinliu 音频解码框架核心库, 提供错误类型、采样格式、声道布局以及位流与校验工具.

pub mod bitwriter;
pub mod channel_layout;
pub mod crc;
pub mod error;
pub mod sample_format;

// 重导出常用类型
pub use bitwriter::LsbBitWriter;
pub use channel_layout::ChannelLayout;
pub use error::{CorruptKind, YinliuError, YinliuResult};
pub use sample_format::SampleFormat;
