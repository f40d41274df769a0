//! 音频声道布局定义.
//!
//! 解码器只支持单声道与立体声, 这里仅保留这两种标准布局.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 声道位掩码, 每个位代表一个扬声器位置
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u32 {
        /// 前方左声道
        const FRONT_LEFT   = 1 << 0;
        /// 前方右声道
        const FRONT_RIGHT  = 1 << 1;
        /// 前方中央声道
        const FRONT_CENTER = 1 << 2;
    }
}

/// 声道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    /// 声道数量
    pub channels: u32,
    /// 声道位掩码
    pub mask: ChannelMask,
}

impl ChannelLayout {
    /// 单声道
    pub const MONO: Self = Self {
        channels: 1,
        mask: ChannelMask::FRONT_CENTER,
    };

    /// 立体声 (左右)
    pub const STEREO: Self = Self {
        channels: 2,
        mask: ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT),
    };

    /// 根据声道数创建布局, 仅支持 1 或 2 声道
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(Self::MONO),
            2 => Some(Self::STEREO),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MONO {
            write!(f, "mono")
        } else if *self == Self::STEREO {
            write!(f, "stereo")
        } else {
            write!(f, "{} channels", self.channels)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channels() {
        assert_eq!(ChannelLayout::from_channels(1), Some(ChannelLayout::MONO));
        assert_eq!(ChannelLayout::from_channels(2), Some(ChannelLayout::STEREO));
        assert_eq!(ChannelLayout::from_channels(6), None);
        assert_eq!(ChannelLayout::STEREO.to_string(), "stereo");
    }
}
