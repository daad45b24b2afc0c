//! 标签匹配与评估.
//!
//! 对每个病例, 先统计预测与真值的标签共现表, 再按 [`MatchMode`] 为每个真值标签配对一个预测对象:
//! `Canonical` 模式下是同值的预测标签, 降级模式下是预测中的一个连通分量.
//! 最后为分类表中的每个结构给出一个 [`Outcome`]:
//!
//! - 真值中有该结构, 且找到了匹配的预测: `Scored`, 记录 Dice (以及可选的 Hausdorff 距离);
//! - 真值中有该结构, 但没有匹配的预测: `Missing`, Dice 记为 0
//!   (或在 `missing_as_zero = false` 时记为不适用);
//! - 真值中没有该结构: `NotApplicable`, 不计入任何分母, 单独计数.

use crate::components::{Components, Connectivity, ExtractMode, Extractor};
use crate::consts::PASS_THRESHOLD;
use crate::taxonomy::Taxonomy;
use crate::{Budget, LabelVolume, Point3, Result};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod baseline;
mod dice;
mod stats;
mod surface;

pub use baseline::{BaselineComparison, Severity};
pub use dice::{component_overlaps, dice_coefficient, Contingency, LabelTally};
pub use stats::{CohortStats, StructureStats, Summary};
pub use surface::{foreground_surface, hausdorff, surface_points};

/// 真值标签与预测标签的配对方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchMode {
    /// 相同的标签值互相匹配. 适用于已经重标注的预测.
    #[default]
    Canonical,

    /// 提取预测的连通分量, 按分量与真值标签的重叠体素数从大到小贪心地一对一匹配.
    Overlap,

    /// 提取预测的连通分量, 按分量质心与真值标签质心的物理距离从小到大贪心地一对一匹配.
    Centroid,
}

/// 评估配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct EvalConfig {
    /// 配对方式.
    pub mode: MatchMode,

    /// 真值中存在但没有匹配预测的结构记为 Dice 0 (`true`) 还是不适用 (`false`).
    pub missing_as_zero: bool,

    /// 是否为每个配对计算对称 Hausdorff 距离.
    pub surface_distance: bool,

    /// 整体胸廓 Dice 不低于该值时病例通过.
    pub pass_threshold: f64,

    /// `Centroid` 模式下允许配对的最大质心距离 (毫米).
    pub max_centroid_mm: Option<f64>,

    /// 降级模式下提取预测分量使用的邻接规则.
    pub connectivity: Connectivity,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::default(),
            missing_as_zero: true,
            surface_distance: false,
            pass_threshold: PASS_THRESHOLD,
            max_centroid_mm: None,
            connectivity: Connectivity::default(),
        }
    }
}

impl EvalConfig {
    /// 设置配对方式.
    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置缺失结构的处理方式.
    pub fn with_missing_as_zero(mut self, yes: bool) -> Self {
        self.missing_as_zero = yes;
        self
    }

    /// 是否计算 Hausdorff 距离.
    pub fn with_surface_distance(mut self, yes: bool) -> Self {
        self.surface_distance = yes;
        self
    }

    /// 设置通过阈值.
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// 设置质心配对的距离上限.
    pub fn with_max_centroid_mm(mut self, mm: Option<f64>) -> Self {
        self.max_centroid_mm = mm;
        self
    }

    /// 设置降级模式下的邻接规则.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }
}

/// 结构不适用的原因.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NotApplicable {
    /// 真值中没有该结构.
    AbsentInTruth,

    /// 真值中有, 但预测中没有匹配, 且配置为不计 0 分.
    AbsentInPrediction,
}

/// 单个结构的评估结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Outcome {
    /// 找到了匹配.
    Scored {
        /// 匹配的预测标签. 降级模式下为所配对分量的来源标签.
        prediction: u8,
        /// 降级模式下所配对预测分量的 id; `Canonical` 模式下为 `None`.
        component: Option<u32>,
        /// Dice 系数.
        dice: f64,
        /// 对称 Hausdorff 距离 (毫米). 未开启时为 `None`.
        hausdorff: Option<f64>,
    },

    /// 真值中有该结构但没有匹配的预测. Dice 记为 0.
    Missing,

    /// 不适用, 不计入任何分母.
    NotApplicable(NotApplicable),
}

impl Outcome {
    /// 计入统计的 Dice. 不适用时返回 `None`.
    #[inline]
    pub fn dice(&self) -> Option<f64> {
        match self {
            Outcome::Scored { dice, .. } => Some(*dice),
            Outcome::Missing => Some(0.0),
            Outcome::NotApplicable(_) => None,
        }
    }

    /// 是否计入分母?
    #[inline]
    pub fn is_applicable(&self) -> bool {
        !matches!(self, Outcome::NotApplicable(_))
    }
}

/// 单个结构的评估记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructureScore {
    /// 真值 (标准) 标签.
    pub label: u8,
    /// 结构名.
    pub name: String,
    /// 结果.
    pub outcome: Outcome,
}

/// 病例判定.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Verdict {
    /// 整体 Dice 不低于阈值.
    Pass,
    /// 整体 Dice 低于阈值.
    Fail,
}

impl Verdict {
    /// 是否通过?
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        })
    }
}

/// 单个病例的评估结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaseScore {
    structures: Vec<StructureScore>,
    unmatched_predictions: Vec<u8>,
    overall_dice: f64,
    mean_dice: Option<f64>,
    verdict: Verdict,
    baseline: Option<BaselineComparison>,
}

impl CaseScore {
    /// 所有结构的记录, 按报告顺序.
    #[inline]
    pub fn structures(&self) -> &[StructureScore] {
        &self.structures
    }

    /// 标签 `label` 的记录.
    pub fn structure(&self, label: u8) -> Option<&StructureScore> {
        self.structures.iter().find(|s| s.label == label)
    }

    /// 没有与任何真值结构配对的预测标签, 升序.
    /// 降级模式下, 只要某标签有一个分量未被配对, 该标签就会出现在这里.
    #[inline]
    pub fn unmatched_predictions(&self) -> &[u8] {
        &self.unmatched_predictions
    }

    /// 整体胸廓 Dice (全部前景对全部前景).
    #[inline]
    pub fn overall_dice(&self) -> f64 {
        self.overall_dice
    }

    /// 适用结构上的平均 Dice. 没有适用结构时为 `None`.
    #[inline]
    pub fn mean_dice(&self) -> Option<f64> {
        self.mean_dice
    }

    /// 判定.
    #[inline]
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// 与基线的对比. 没有提供基线时为 `None`.
    #[inline]
    pub fn baseline(&self) -> Option<&BaselineComparison> {
        self.baseline.as_ref()
    }

    /// 不适用的结构个数.
    pub fn not_applicable(&self) -> usize {
        self.structures
            .iter()
            .filter(|s| !s.outcome.is_applicable())
            .count()
    }
}

/// 评估器. 只借用配置与分类表.
#[derive(Copy, Clone, Debug)]
pub struct Evaluator<'a> {
    config: &'a EvalConfig,
    taxonomy: &'a Taxonomy,
}

impl<'a> Evaluator<'a> {
    /// 创建评估器.
    #[inline]
    pub fn new(config: &'a EvalConfig, taxonomy: &'a Taxonomy) -> Self {
        Self { config, taxonomy }
    }

    /// 评估预测 `pred` 与真值 `truth`.
    ///
    /// # 返回值
    ///
    /// - 两者不在同一网格上时返回 `Err(Error::ShapeMismatch)`;
    /// - 仿射矩阵不可用时返回 `Err(Error::InvalidGeometry)`.
    #[inline]
    pub fn evaluate(&self, pred: &LabelVolume, truth: &LabelVolume) -> Result<CaseScore> {
        self.evaluate_with_budget(pred, truth, &Budget::unlimited())
    }

    /// 同 [`Self::evaluate`], 但在各阶段之间检查 `budget`.
    #[inline]
    pub fn evaluate_with_budget(
        &self,
        pred: &LabelVolume,
        truth: &LabelVolume,
        budget: &Budget,
    ) -> Result<CaseScore> {
        self.evaluate_with_baseline(pred, truth, None, budget)
    }

    /// 同 [`Self::evaluate_with_budget`]. 提供 `baseline` 时额外计算
    /// [`BaselineComparison`]; 基线不在真值网格上时返回 `Err(Error::ShapeMismatch)`.
    pub fn evaluate_with_baseline(
        &self,
        pred: &LabelVolume,
        truth: &LabelVolume,
        baseline: Option<&LabelVolume>,
        budget: &Budget,
    ) -> Result<CaseScore> {
        pred.same_grid(truth)?;
        truth.affine().validate()?;
        budget.check()?;

        let table = Contingency::build(pred.data(), truth.data());
        budget.check()?;
        let pairing = match self.config.mode {
            MatchMode::Canonical => Pairing::by_label(&table),
            mode => self.match_components(mode, &table, pred, truth, budget)?,
        };

        let surfaces = if self.config.surface_distance {
            let pred_surfaces: BTreeMap<Piece, Vec<Point3>> = match &pairing.components {
                Some(c) => surface_points(c.id_map(), pred.affine())
                    .into_iter()
                    .map(|(id, v)| (Piece::Component(id), v))
                    .collect(),
                None => surface_points(pred.data(), pred.affine())
                    .into_iter()
                    .map(|(l, v)| (Piece::Label(l), v))
                    .collect(),
            };
            let s = (pred_surfaces, surface_points(truth.data(), truth.affine()));
            budget.check()?;
            Some(s)
        } else {
            None
        };

        let structures = self.score_structures(&table, &pairing, surfaces.as_ref(), budget)?;

        let baseline = match baseline {
            Some(b) => Some(BaselineComparison::compute(pred, b, truth, budget)?),
            None => None,
        };
        budget.check()?;

        let overall_dice = table.overall_dice();
        let mean_dice = structures
            .iter()
            .filter_map(|s| s.outcome.dice())
            .collect::<Summary>()
            .mean();
        let verdict = if overall_dice >= self.config.pass_threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        Ok(CaseScore {
            structures,
            unmatched_predictions: pairing.unmatched,
            overall_dice,
            mean_dice,
            verdict,
            baseline,
        })
    }

    /// 为报告中的每个结构给出结果. 每个结构之前检查一次 `budget`.
    fn score_structures(
        &self,
        table: &Contingency,
        pairing: &Pairing,
        surfaces: Option<&Surfaces>,
        budget: &Budget,
    ) -> Result<Vec<StructureScore>> {
        let mut structures = vec![];
        for g in self.structure_order(table) {
            budget.check()?;
            let outcome = if table.truth_tally(g).is_none() {
                Outcome::NotApplicable(NotApplicable::AbsentInTruth)
            } else {
                match pairing.matched.get(&g) {
                    Some(m) => {
                        let hausdorff = surfaces.and_then(|(sp, sg)| {
                            hausdorff(sp.get(&m.piece)?.as_slice(), sg.get(&g)?.as_slice())
                        });
                        Outcome::Scored {
                            prediction: m.label,
                            component: m.piece.component(),
                            dice: m.dice,
                            hausdorff,
                        }
                    }
                    None if self.config.missing_as_zero => Outcome::Missing,
                    None => Outcome::NotApplicable(NotApplicable::AbsentInPrediction),
                }
            };
            structures.push(StructureScore {
                label: g,
                name: self.taxonomy.name(g).into_owned(),
                outcome,
            });
        }
        Ok(structures)
    }

    /// 报告中的结构顺序: 分类表的顺序, 然后是真值中出现但不在表中的标签.
    fn structure_order(&self, table: &Contingency) -> Vec<u8> {
        let mut ans = self.taxonomy.report_order();
        ans.extend(table.truth_labels().filter(|g| !self.taxonomy.contains(*g)));
        ans
    }

    /// 降级模式: 提取预测的连通分量, 将分量与真值标签一对一配对.
    /// Dice 在分量掩码与真值标签掩码之间计算.
    fn match_components(
        &self,
        mode: MatchMode,
        table: &Contingency,
        pred: &LabelVolume,
        truth: &LabelVolume,
        budget: &Budget,
    ) -> Result<Pairing> {
        let components = Extractor::new(self.config.connectivity, ExtractMode::PerLabel)
            .extract_with_budget(pred, budget)?;
        let overlaps = component_overlaps(components.id_map(), truth.data());
        budget.check()?;

        let assigned = if mode == MatchMode::Centroid {
            let affine = truth.affine();
            let mut pairs = vec![];
            for g in table.truth_labels() {
                let Some(cg) = table.truth_tally(g).and_then(|t| t.centroid(affine)) else {
                    continue;
                };
                for c in components.iter() {
                    let d = distance(&c.centroid(), &cg);
                    if self.config.max_centroid_mm.map_or(true, |max| d <= max) {
                        pairs.push((OrderedFloat(d), g, c.id()));
                    }
                }
            }
            pairs.sort();
            greedy(pairs.into_iter().map(|(_, g, id)| (id, g)))
        } else {
            let mut pairs: Vec<_> = overlaps
                .iter()
                .map(|(&(id, g), &n)| (Reverse(n), g, id))
                .collect();
            pairs.sort();
            greedy(pairs.into_iter().map(|(_, g, id)| (id, g)))
        };

        let mut matched = BTreeMap::new();
        for (&g, &id) in assigned.iter() {
            let (Some(c), Some(t)) = (components.get(id), table.truth_tally(g)) else {
                continue;
            };
            let n = overlaps.get(&(id, g)).copied().unwrap_or(0);
            matched.insert(
                g,
                Matched {
                    piece: Piece::Component(id),
                    label: c.label(),
                    dice: dice_coefficient(n, c.voxels(), t.voxels),
                },
            );
        }

        let used: BTreeSet<u32> = assigned.values().copied().collect();
        let unmatched: BTreeSet<u8> = components
            .iter()
            .filter(|c| !used.contains(&c.id()))
            .map(|c| c.label())
            .collect();

        Ok(Pairing {
            matched,
            unmatched: unmatched.into_iter().collect(),
            components: Some(components),
        })
    }
}

/// 与真值结构配对的预测对象.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum Piece {
    /// 整个预测标签.
    Label(u8),
    /// 预测中的一个连通分量.
    Component(u32),
}

impl Piece {
    #[inline]
    fn component(&self) -> Option<u32> {
        match self {
            Piece::Component(id) => Some(*id),
            Piece::Label(_) => None,
        }
    }
}

/// 预测对象与真值标签的表面点集.
type Surfaces = (BTreeMap<Piece, Vec<Point3>>, BTreeMap<u8, Vec<Point3>>);

/// 一个真值结构的配对.
#[derive(Copy, Clone, Debug)]
struct Matched {
    piece: Piece,
    /// 来源预测标签.
    label: u8,
    dice: f64,
}

/// 一个病例的全部配对.
struct Pairing {
    /// 真值标签 -> 配对.
    matched: BTreeMap<u8, Matched>,
    unmatched: Vec<u8>,
    /// 降级模式下提取的预测分量, 用于计算分量表面.
    components: Option<Components>,
}

impl Pairing {
    /// `Canonical` 模式: 相同的标签值互相匹配.
    fn by_label(table: &Contingency) -> Self {
        let matched: BTreeMap<u8, Matched> = table
            .truth_labels()
            .filter(|g| table.pred_tally(*g).is_some())
            .map(|g| {
                let m = Matched {
                    piece: Piece::Label(g),
                    label: g,
                    dice: table.dice(g, g),
                };
                (g, m)
            })
            .collect();
        let unmatched = table.pred_labels().filter(|p| !matched.contains_key(p)).collect();
        Self {
            matched,
            unmatched,
            components: None,
        }
    }
}

#[inline]
fn distance(a: &Point3, b: &Point3) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// 按给定顺序贪心地一对一配对 `(预测分量, 真值标签)`. 返回 `真值标签 -> 分量 id`.
fn greedy<I: IntoIterator<Item = (u32, u8)>>(pairs: I) -> BTreeMap<u8, u32> {
    let mut ans = BTreeMap::new();
    let mut used = BTreeSet::new();
    for (p, g) in pairs {
        if !ans.contains_key(&g) && !used.contains(&p) {
            ans.insert(g, p);
            used.insert(p);
        }
    }
    ans
}
