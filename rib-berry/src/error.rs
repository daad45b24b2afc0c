//! 运行时错误.

use crate::data::GridMismatch;
use thiserror::Error;

/// 仿射矩阵的几何缺陷.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GeometryDefect {
    /// 矩阵中存在 NaN 或 inf.
    #[error("affine contains non-finite entries")]
    NonFinite,

    /// 最后一行不是 `[0, 0, 0, 1]`.
    #[error("affine bottom row is not [0, 0, 0, 1]")]
    NotAffine,

    /// 线性部分奇异 (不可逆). 参数为其行列式.
    #[error("affine linear part is singular (det = {0:e})")]
    Singular(f64),

    /// 两个方向列向量不正交. 参数依次为两列的下标和夹角余弦.
    #[error("direction columns {0} and {1} are not orthogonal (cos = {2:.4})")]
    NotOrthogonal(usize, usize, f64),
}

/// 单个病例的致命错误. 批处理时它们只会导致对应病例失败, 不会中断整个批次.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// 仿射矩阵退化或不可逆.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryDefect),

    /// 预测与真值不在同一体素网格上.
    #[error("prediction and ground truth grids differ: {0}")]
    ShapeMismatch(#[from] GridMismatch),

    /// 病例处理超出时间预算.
    #[error("case exceeded its time budget")]
    Timeout,

    /// 病例被外部取消.
    #[error("case was cancelled")]
    Cancelled,

    /// 外部适配层无法提供体数据 (文件缺失, 格式错误等).
    #[error("volume could not be loaded: {0}")]
    Unreadable(String),

    /// 外部适配层无法保存病例产物 (例如重标注结果).
    #[error("output could not be written: {0}")]
    Unwritable(String),
}

impl Error {
    /// 错误的简短类别名, 用于报告.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidGeometry(_) => "InvalidGeometry",
            Error::ShapeMismatch(_) => "ShapeMismatch",
            Error::Timeout => "Timeout",
            Error::Cancelled => "Cancelled",
            Error::Unreadable(_) => "Unreadable",
            Error::Unwritable(_) => "Unwritable",
        }
    }
}

/// 本 crate 的运行时结果.
pub type Result<T> = std::result::Result<T, Error>;
