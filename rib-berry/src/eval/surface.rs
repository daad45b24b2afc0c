//! 表面体素与对称 Hausdorff 距离.
//!
//! 采用 "早停" 算法: 对 A 中的每个点, 一旦在 B 中找到一个比当前最大值更近的点,
//! 就不可能再更新最大值, 可以立刻停止内层循环. 将两个点集随机打乱后,
//! 平均复杂度接近线性. 打乱使用固定种子, 结果完全可复现.

use crate::components::Connectivity;
use crate::consts::canonical::is_background;
use crate::{Affine, LabelVolume, Point3};
use ndarray::ArrayView3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// 打乱点集使用的固定种子.
const SHUFFLE_SEED: u64 = 0x5EED_4B1B;

/// 收集所有前景取值的表面体素 (至少有一个 6-邻居取值不同, 或位于体数据边界),
/// 并变换到物理空间. 每个取值内部的点已被打乱.
///
/// `T::default()` 视为背景. 标签图 (`u8`) 与分量 id 图 (`u32`) 都适用.
pub fn surface_points<T>(data: ArrayView3<T>, affine: &Affine) -> BTreeMap<T, Vec<Point3>>
where
    T: Copy + Ord + Default,
{
    let shape = data.dim();
    let offsets = Connectivity::Face6.offsets();
    let mut ans: BTreeMap<T, Vec<Point3>> = BTreeMap::new();

    for (pos, &p) in data.indexed_iter().filter(|(_, p)| **p != T::default()) {
        let on_surface = offsets.iter().any(|d| match LabelVolume::offset(pos, *d, shape) {
            Some(n) => data[n] != p,
            None => true,
        });
        if on_surface {
            ans.entry(p).or_default().push(affine.voxel_to_physical(pos));
        }
    }

    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    for points in ans.values_mut() {
        points.shuffle(&mut rng);
    }
    ans
}

/// 整个前景 (所有非背景标签视为同一结构) 的表面体素.
pub fn foreground_surface(volume: &LabelVolume) -> Vec<Point3> {
    let mask = volume.data().mapv(|p| !is_background(p));
    surface_points(mask.view(), volume.affine())
        .remove(&true)
        .unwrap_or_default()
}

#[inline]
fn distance2(a: &Point3, b: &Point3) -> f64 {
    let (dx, dy, dz) = (a[0] - b[0], a[1] - b[1], a[2] - b[2]);
    dx * dx + dy * dy + dz * dz
}

/// 有向 Hausdorff 距离的平方 `max_{a ∈ A} min_{b ∈ B} |a - b|^2`.
fn directed2(a: &[Point3], b: &[Point3]) -> f64 {
    let mut cmax = 0.0f64;
    for pa in a {
        let mut cmin = f64::INFINITY;
        for pb in b {
            let d = distance2(pa, pb);
            if d < cmax {
                cmin = d;
                break;
            }
            cmin = cmin.min(d);
        }
        if cmin > cmax && cmin.is_finite() {
            cmax = cmin;
        }
    }
    cmax
}

/// 两个点集之间的对称 Hausdorff 距离 (毫米). 任一点集为空时返回 `None`.
pub fn hausdorff(a: &[Point3], b: &[Point3]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(directed2(a, b).max(directed2(b, a)).sqrt())
}
