//! 标签共现表与 Dice 系数.

use crate::consts::canonical::is_background;
use crate::{Affine, Point3};
use ndarray::{ArrayView2, ArrayView3, Axis, Zip};
use std::collections::BTreeMap;

/// Dice 系数 `2|P∩G| / (|P| + |G|)`. 两者均为空时定义为 `1.0`.
#[inline]
pub fn dice_coefficient(intersection: usize, pred: usize, truth: usize) -> f64 {
    match pred + truth {
        0 => 1.0,
        sum => 2.0 * intersection as f64 / sum as f64,
    }
}

/// 分量 id 图与真值标签图的共现计数: `(分量 id, 真值标签) -> 体素数`.
/// 只统计双方均为前景的体素. 两个数组形状必须一致.
pub fn component_overlaps(ids: ArrayView3<u32>, truth: ArrayView3<u8>) -> BTreeMap<(u32, u8), usize> {
    let mut ans = BTreeMap::new();
    Zip::from(ids).and(truth).for_each(|&c, &g| {
        if c != 0 && !is_background(g) {
            *ans.entry((c, g)).or_insert(0) += 1;
        }
    });
    ans
}

/// 单个标签的体素数与 `(z, h, w)` 索引和.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LabelTally {
    /// 体素个数.
    pub voxels: usize,
    sum: [u64; 3],
}

impl LabelTally {
    #[inline]
    fn push(&mut self, z: usize, h: usize, w: usize) {
        self.voxels += 1;
        self.sum[0] += z as u64;
        self.sum[1] += h as u64;
        self.sum[2] += w as u64;
    }

    #[inline]
    fn merge(&mut self, other: &Self) {
        self.voxels += other.voxels;
        for (a, b) in self.sum.iter_mut().zip(other.sum) {
            *a += b;
        }
    }

    /// 物理空间质心. 空标签返回 `None`.
    pub fn centroid(&self, affine: &Affine) -> Option<Point3> {
        (self.voxels > 0).then(|| {
            let n = self.voxels as f64;
            affine.index_to_physical(self.sum.map(|s| s as f64 / n))
        })
    }
}

/// 预测与真值的标签共现表. 只记录前景.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contingency {
    pred: BTreeMap<u8, LabelTally>,
    truth: BTreeMap<u8, LabelTally>,
    /// `(预测标签, 真值标签) -> 重叠体素数`.
    overlap: BTreeMap<(u8, u8), usize>,
    /// 两者均为前景的体素数.
    both_foreground: usize,
}

impl Contingency {
    /// 统计单个水平切片.
    fn from_slice(z: usize, pred: ArrayView2<u8>, truth: ArrayView2<u8>) -> Self {
        let mut ans = Self::default();
        for (((h, w), &p), &g) in pred.indexed_iter().zip(truth.iter()) {
            if !is_background(p) {
                ans.pred.entry(p).or_default().push(z, h, w);
            }
            if !is_background(g) {
                ans.truth.entry(g).or_default().push(z, h, w);
            }
            if !is_background(p) && !is_background(g) {
                *ans.overlap.entry((p, g)).or_insert(0) += 1;
                ans.both_foreground += 1;
            }
        }
        ans
    }

    /// 合并另一部分的统计结果.
    pub fn merge(mut self, other: Self) -> Self {
        for (l, t) in other.pred {
            self.pred.entry(l).or_default().merge(&t);
        }
        for (l, t) in other.truth {
            self.truth.entry(l).or_default().merge(&t);
        }
        for (k, c) in other.overlap {
            *self.overlap.entry(k).or_insert(0) += c;
        }
        self.both_foreground += other.both_foreground;
        self
    }

    /// 统计两个同形状数组. 形状不同时 panic.
    pub fn build(pred: ArrayView3<u8>, truth: ArrayView3<u8>) -> Self {
        assert_eq!(pred.dim(), truth.dim());
        tally_slices(pred, truth)
    }

    /// 预测中出现的前景标签, 升序.
    #[inline]
    pub fn pred_labels(&self) -> impl Iterator<Item = u8> + '_ {
        self.pred.keys().copied()
    }

    /// 真值中出现的前景标签, 升序.
    #[inline]
    pub fn truth_labels(&self) -> impl Iterator<Item = u8> + '_ {
        self.truth.keys().copied()
    }

    /// 预测标签 `p` 的统计.
    #[inline]
    pub fn pred_tally(&self, p: u8) -> Option<&LabelTally> {
        self.pred.get(&p)
    }

    /// 真值标签 `g` 的统计.
    #[inline]
    pub fn truth_tally(&self, g: u8) -> Option<&LabelTally> {
        self.truth.get(&g)
    }

    /// 预测标签 `p` 与真值标签 `g` 的重叠体素数.
    #[inline]
    pub fn overlap(&self, p: u8, g: u8) -> usize {
        self.overlap.get(&(p, g)).copied().unwrap_or(0)
    }

    /// 所有重叠非零的 `((p, g), 重叠数)`.
    #[inline]
    pub fn overlaps(&self) -> impl Iterator<Item = ((u8, u8), usize)> + '_ {
        self.overlap.iter().map(|(k, v)| (*k, *v))
    }

    /// 预测标签 `p` 与真值标签 `g` 的 Dice 系数.
    pub fn dice(&self, p: u8, g: u8) -> f64 {
        let np = self.pred.get(&p).map_or(0, |t| t.voxels);
        let ng = self.truth.get(&g).map_or(0, |t| t.voxels);
        dice_coefficient(self.overlap(p, g), np, ng)
    }

    /// 全部前景对全部前景的 Dice 系数 (不区分标签). 两者均为空时为 `1.0`.
    pub fn overall_dice(&self) -> f64 {
        let np = self.pred.values().map(|t| t.voxels).sum();
        let ng = self.truth.values().map(|t| t.voxels).sum();
        dice_coefficient(self.both_foreground, np, ng)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        /// 借助 `rayon`, 并行地逐切片统计后合并.
        fn tally_slices(pred: ArrayView3<u8>, truth: ArrayView3<u8>) -> Contingency {
            pred.axis_iter(Axis(0))
                .zip(truth.axis_iter(Axis(0)))
                .enumerate()
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(|(z, (p, g))| Contingency::from_slice(z, p, g))
                .reduce(Contingency::default, Contingency::merge)
        }
    } else {
        fn tally_slices(pred: ArrayView3<u8>, truth: ArrayView3<u8>) -> Contingency {
            pred.axis_iter(Axis(0))
                .zip(truth.axis_iter(Axis(0)))
                .enumerate()
                .map(|(z, (p, g))| Contingency::from_slice(z, p, g))
                .fold(Contingency::default(), Contingency::merge)
        }
    }
}
