//! 统一错误类型定义.
//!
//! 所有 yinliu crate 共用的错误类型, 支持跨模块传播.
//! 码流结构错误统一归入 [`YinliuError::Corrupt`], 并以 [`CorruptKind`] 区分类别.

use std::fmt;

use thiserror::Error;

/// 致命码流错误的类别
///
/// 任何一种都会使整条码流不可用, 不做局部恢复.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptKind {
    /// 签名/同步字错误
    Signature,
    /// 必需字段为零或取值非法
    InvalidField,
    /// 跨表引用越界
    BadReference,
    /// Huffman 码长表欠指定或过度指定
    HuffmanTree,
    /// 保留字段非零
    ReservedBits,
    /// 尺寸或数量超过安全上限
    LimitExceeded,
    /// 分区大小不能被码本维度整除
    PartitionSize,
    /// 头包在必需段落中途结束
    TruncatedHeader,
    /// 页面校验和不匹配
    Checksum,
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signature => "签名错误",
            Self::InvalidField => "字段非法",
            Self::BadReference => "引用越界",
            Self::HuffmanTree => "Huffman 树非法",
            Self::ReservedBits => "保留位非零",
            Self::LimitExceeded => "超出上限",
            Self::PartitionSize => "分区大小非法",
            Self::TruncatedHeader => "头包截断",
            Self::Checksum => "校验失败",
        };
        f.write_str(name)
    }
}

/// yinliu 统一错误类型
#[derive(Debug, Error)]
pub enum YinliuError {
    /// 无效参数 (调用方用法错误)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 码流合法但超出支持范围
    #[error("不支持的码流: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 码流损坏 (结构性错误, 不可恢复)
    #[error("码流损坏 ({kind}): {detail}")]
    Corrupt {
        /// 错误类别
        kind: CorruptKind,
        /// 详细描述
        detail: String,
    },

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl YinliuError {
    /// 构造码流损坏错误
    pub fn corrupt(kind: CorruptKind, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            kind,
            detail: detail.into(),
        }
    }

    /// 若为码流损坏错误, 返回其类别
    pub fn corrupt_kind(&self) -> Option<CorruptKind> {
        match self {
            Self::Corrupt { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// yinliu 统一 Result 类型
pub type YinliuResult<T> = Result<T, YinliuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_错误信息与类别() {
        let err = YinliuError::corrupt(CorruptKind::HuffmanTree, "码长表欠指定");
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::HuffmanTree));
        assert_eq!(err.to_string(), "码流损坏 (Huffman 树非法): 码长表欠指定");
    }

    #[test]
    fn test_io_错误转换() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: YinliuError = io.into();
        assert!(matches!(err, YinliuError::Io(_)));
        assert_eq!(err.corrupt_kind(), None);
    }
}
