//! 与基线分割的整体 Hausdorff 对比.
//!
//! 基线通常是某个现成工具的输出. 对真值, 预测与基线分别取整个前景的表面,
//! 计算 `HD(真值, 预测)` 与 `HD(真值, 基线)`, 再以基线为参照给出改进百分比和分级.

use super::surface::{foreground_surface, hausdorff};
use crate::consts::{IMPROVEMENT_MILD_PCT, IMPROVEMENT_MODERATE_PCT, IMPROVEMENT_PASS_PCT};
use crate::{Budget, LabelVolume, Result};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 相对基线的改进分级.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    /// 改进不低于 30%.
    Pass,
    /// 改进位于 `[20%, 30%)`.
    Mild,
    /// 改进位于 `[10%, 20%)`.
    Moderate,
    /// 改进低于 10% (包括变差).
    Severe,
}

impl Severity {
    /// 按改进百分比分级. `NaN` 视为重度.
    pub fn classify(improvement_pct: f64) -> Self {
        if improvement_pct >= IMPROVEMENT_PASS_PCT {
            Severity::Pass
        } else if improvement_pct >= IMPROVEMENT_MILD_PCT {
            Severity::Mild
        } else if improvement_pct >= IMPROVEMENT_MODERATE_PCT {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }

    /// 对应的后续处理建议.
    pub fn recommendation(&self) -> &'static str {
        match self {
            Severity::Pass => "no intervention needed",
            Severity::Mild => "optional smoothing",
            Severity::Moderate => "smoothing recommended",
            Severity::Severe => "manual correction required",
        }
    }

    /// 是否通过?
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Severity::Pass)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Pass => "PASS",
            Severity::Mild => "MILD",
            Severity::Moderate => "MODERATE",
            Severity::Severe => "SEVERE",
        })
    }
}

/// 单个病例与基线的对比结果.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineComparison {
    /// 真值与预测整个前景之间的 Hausdorff 距离 (毫米). 任一方为空时为 `None`.
    pub hd_prediction: Option<f64>,
    /// 真值与基线整个前景之间的 Hausdorff 距离 (毫米).
    pub hd_baseline: Option<f64>,
    /// `(hd_baseline - hd_prediction) / hd_baseline * 100`.
    /// 任一距离缺失或基线距离为 0 时为 `0`.
    pub improvement_pct: f64,
    /// 分级.
    pub severity: Severity,
}

impl BaselineComparison {
    /// 由两个距离计算改进百分比与分级.
    pub fn new(hd_prediction: Option<f64>, hd_baseline: Option<f64>) -> Self {
        let improvement_pct = match (hd_prediction, hd_baseline) {
            (Some(p), Some(b)) if b != 0.0 => (b - p) / b * 100.0,
            _ => 0.0,
        };
        Self {
            hd_prediction,
            hd_baseline,
            improvement_pct,
            severity: Severity::classify(improvement_pct),
        }
    }

    /// 对比 `pred` 和 `baseline` 相对 `truth` 的整体 Hausdorff 距离.
    ///
    /// 三者必须位于同一网格上, 否则返回 `Err(Error::ShapeMismatch)`.
    pub fn compute(
        pred: &LabelVolume,
        baseline: &LabelVolume,
        truth: &LabelVolume,
        budget: &Budget,
    ) -> Result<Self> {
        pred.same_grid(truth)?;
        baseline.same_grid(truth)?;
        truth.affine().validate()?;

        let reference = foreground_surface(truth);
        budget.check()?;
        let hd_prediction = hausdorff(&foreground_surface(pred), &reference);
        budget.check()?;
        let hd_baseline = hausdorff(&foreground_surface(baseline), &reference);
        budget.check()?;
        Ok(Self::new(hd_prediction, hd_baseline))
    }
}
