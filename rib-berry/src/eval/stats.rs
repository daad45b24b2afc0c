//! 可合并的统计量, 以及队列层面的汇总.

use super::{CaseScore, Outcome, Severity};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 计数, 均值与总体方差. 使用 Welford 递推, 两个部分结果可以按 Chan 公式合并.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Summary {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Summary {
    /// 加入一个样本.
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// 合并另一部分的结果.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n = (self.count + other.count) as f64;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / n;
        self.m2 += other.m2 + delta * delta * (self.count as f64) * (other.count as f64) / n;
        self.count += other.count;
    }

    /// 样本个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// 均值. 没有样本时为 `None`.
    #[inline]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// 总体方差. 没有样本时为 `None`.
    #[inline]
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    /// 总体标准差.
    #[inline]
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

impl FromIterator<f64> for Summary {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let mut ans = Self::default();
        for x in iter {
            ans.push(x);
        }
        ans
    }
}

/// 单个结构在整个队列上的统计.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructureStats {
    /// 结构名.
    pub name: String,
    /// 适用病例上的 Dice (包括缺失结构的 0 分).
    pub dice: Summary,
    /// 其中缺失 (Dice 记为 0) 的病例数.
    pub missing: usize,
    /// 不适用的病例数. 不计入 `dice` 的分母.
    pub not_applicable: usize,
    /// 计算过 Hausdorff 距离的病例上的距离 (毫米).
    pub hausdorff: Summary,
}

impl StructureStats {
    fn merge(&mut self, other: &Self) {
        if self.name.is_empty() {
            self.name.clone_from(&other.name);
        }
        self.dice.merge(&other.dice);
        self.missing += other.missing;
        self.not_applicable += other.not_applicable;
        self.hausdorff.merge(&other.hausdorff);
    }
}

/// 队列层面的汇总.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CohortStats {
    /// 每个结构的统计, 以标签值为键.
    pub structures: BTreeMap<u8, StructureStats>,
    /// 病例平均 Dice 的分布. 没有任何适用结构的病例不计入.
    pub mean_dice: Summary,
    /// 整体胸廓 Dice 的分布.
    pub overall_dice: Summary,
    /// 病例数.
    pub cases: usize,
    /// 通过的病例数.
    pub passed: usize,
    /// 提供了基线的病例上, 相对基线的 Hausdorff 改进百分比.
    pub improvement: Summary,
    /// 提供了基线的病例按改进分级的计数.
    pub severity: BTreeMap<Severity, usize>,
}

impl CohortStats {
    /// 加入一个病例.
    pub fn push(&mut self, case: &CaseScore) {
        self.cases += 1;
        self.passed += case.verdict().is_pass() as usize;
        self.overall_dice.push(case.overall_dice());
        if let Some(m) = case.mean_dice() {
            self.mean_dice.push(m);
        }
        if let Some(b) = case.baseline() {
            self.improvement.push(b.improvement_pct);
            *self.severity.entry(b.severity).or_insert(0) += 1;
        }
        for s in case.structures() {
            let e = self.structures.entry(s.label).or_default();
            if e.name.is_empty() {
                e.name.clone_from(&s.name);
            }
            match &s.outcome {
                Outcome::Scored { dice, hausdorff, .. } => {
                    e.dice.push(*dice);
                    if let Some(h) = hausdorff {
                        e.hausdorff.push(*h);
                    }
                }
                Outcome::Missing => {
                    e.dice.push(0.0);
                    e.missing += 1;
                }
                Outcome::NotApplicable(_) => e.not_applicable += 1,
            }
        }
    }

    /// 合并另一部分病例的汇总.
    pub fn merge(&mut self, other: &Self) {
        for (l, s) in &other.structures {
            self.structures.entry(*l).or_default().merge(s);
        }
        self.mean_dice.merge(&other.mean_dice);
        self.overall_dice.merge(&other.overall_dice);
        self.cases += other.cases;
        self.passed += other.passed;
        self.improvement.merge(&other.improvement);
        for (k, n) in &other.severity {
            *self.severity.entry(*k).or_insert(0) += n;
        }
    }

    /// 分级为 `severity` 的病例数.
    #[inline]
    pub fn severity_count(&self, severity: Severity) -> usize {
        self.severity.get(&severity).copied().unwrap_or(0)
    }

    /// 所有结构的 Dice 样本合并后的统计.
    pub fn pooled_dice(&self) -> Summary {
        let mut ans = Summary::default();
        for s in self.structures.values() {
            ans.merge(&s.dice);
        }
        ans
    }
}

impl<'a> FromIterator<&'a CaseScore> for CohortStats {
    fn from_iter<T: IntoIterator<Item = &'a CaseScore>>(iter: T) -> Self {
        let mut ans = Self::default();
        for c in iter {
            ans.push(c);
        }
        ans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_summary_welford() {
        let s: Summary = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        assert_eq!(s.count(), 8);
        assert!(f64_eq(s.mean().unwrap(), 5.0));
        assert!(f64_eq(s.variance().unwrap(), 4.0));
        assert!(f64_eq(s.std_dev().unwrap(), 2.0));
        assert_eq!(Summary::default().mean(), None);
    }

    #[test]
    fn test_summary_merge_matches_sequential() {
        let xs = [0.91, 0.35, 0.0, 0.77, 0.88, 0.12, 0.5];
        let all: Summary = xs.iter().copied().collect();
        let mut left: Summary = xs[..3].iter().copied().collect();
        let right: Summary = xs[3..].iter().copied().collect();
        left.merge(&right);
        assert_eq!(left.count(), all.count());
        assert!((left.mean().unwrap() - all.mean().unwrap()).abs() < 1e-12);
        assert!((left.variance().unwrap() - all.variance().unwrap()).abs() < 1e-12);

        let mut empty = Summary::default();
        empty.merge(&all);
        assert_eq!(empty, all);
    }
}
