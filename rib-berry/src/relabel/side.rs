//! 中线定位与左右侧别划分.

use crate::components::Component;
use crate::consts::Side;
use crate::{Frame, LabelVolume};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 矢状中线在物理 x 轴上的位置.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Midline {
    /// 体数据八个角点体素中心的物理 x 范围的中点.
    #[default]
    VolumeCenter,

    /// 固定的物理 x 坐标 (毫米).
    Fixed(f64),
}

impl Midline {
    /// 求出中线的物理 x 坐标.
    pub fn resolve(&self, volume: &LabelVolume) -> f64 {
        match *self {
            Midline::VolumeCenter => {
                let (lo, hi) = volume.physical_x_extent();
                (lo + hi) * 0.5
            }
            Midline::Fixed(x) => x,
        }
    }
}

/// 物理 x 坐标为 `x` 的点位于患者哪一侧. 恰好落在中线上的点归为右侧.
#[inline]
pub fn side_of(x: f64, midline: f64, frame: Frame) -> Side {
    let right = match frame {
        Frame::Ras => x >= midline,
        Frame::Lps => x <= midline,
    };
    if right {
        Side::Right
    } else {
        Side::Left
    }
}

/// 按侧别划分后的分量. 每侧内部按分量输出顺序 (体素数降序) 排列.
#[derive(Debug, Default)]
pub(crate) struct SideSplit<'a> {
    pub right: Vec<&'a Component>,
    pub left: Vec<&'a Component>,
    /// 距中线不足歧义距离的分量, 以及其质心相对中线的 x 偏移 (毫米).
    pub ambiguous: Vec<(&'a Component, f64)>,
}

impl<'a> SideSplit<'a> {
    /// 某一侧的分量 (可变).
    #[inline]
    pub fn side_mut(&mut self, side: Side) -> &mut Vec<&'a Component> {
        match side {
            Side::Right => &mut self.right,
            Side::Left => &mut self.left,
        }
    }
}

/// 将分量划分到左右两侧. 结果与输入顺序无关.
pub(crate) fn split<'a, I>(components: I, midline: f64, frame: Frame, ambiguity_mm: f64) -> SideSplit<'a>
where
    I: IntoIterator<Item = &'a Component>,
{
    let mut ans = SideSplit::default();
    for c in components {
        let x = c.centroid()[0];
        if (x - midline).abs() < ambiguity_mm {
            ans.ambiguous.push((c, x - midline));
        }
        ans.side_mut(side_of(x, midline, frame)).push(c);
    }
    ans.right.sort_by_key(|c| c.rank_key());
    ans.left.sort_by_key(|c| c.rank_key());
    ans.ambiguous.sort_by_key(|(c, _)| c.rank_key());
    ans
}

/// 按物理 z 降序 (自上而下) 排列, 并列时按分量输出顺序.
pub(crate) fn sort_superior_first(side: &mut [&Component]) {
    side.sort_by_key(|c| (Reverse(OrderedFloat(c.centroid()[2])), c.rank_key()));
}
