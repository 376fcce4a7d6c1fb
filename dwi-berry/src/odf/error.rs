//! 运行时错误.

use std::fmt;

use crate::qball::ReconstructError;

/// ODF 极大值提取的运行时错误. 出现错误时不产生任何输出.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    /// 参数不合法. 参数为具体说明.
    InvalidParameter(&'static str),

    /// 掩膜与球谐系数图像形状不一致.
    ///
    /// 第一个参数为系数图像形状, 第二个参数为掩膜形状.
    ShapeMismatch((usize, usize, usize), (usize, usize, usize)),

    /// 既没有提供球谐系数图像, 也没有提供可用于重建的 DWI 数据.
    MissingCoefficients,

    /// 从 DWI 数据重建球谐系数失败.
    Reconstruct(ReconstructError),

    /// 被调用方取消.
    Cancelled,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::InvalidParameter(s) => write!(f, "invalid parameter: {s}"),
            ExtractError::ShapeMismatch(a, b) => {
                write!(f, "mask shape {b:?} does not match coefficient image shape {a:?}")
            }
            ExtractError::MissingCoefficients => {
                write!(f, "no SH coefficient image and no DWI data to reconstruct one")
            }
            ExtractError::Reconstruct(e) => write!(f, "SH reconstruction failed: {e}"),
            ExtractError::Cancelled => write!(f, "extraction cancelled"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<ReconstructError> for ExtractError {
    fn from(e: ReconstructError) -> Self {
        ExtractError::Reconstruct(e)
    }
}

/// 极大值提取结果.
pub type ExtractResult<T> = Result<T, ExtractError>;
