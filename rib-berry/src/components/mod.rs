//! 三维连通分量提取.
//!
//! 对体数据做单遍 BFS 洪泛填充. 所有分量存放在一个以整数 id 索引的 arena 中,
//! 另有一个与体数据同形状的 id 图 (`0` 表示不属于任何分量), 分量与体数据之间不存在相互引用.
//!
//! # 邻接规则
//!
//! 默认使用 18-邻接 ([`Connectivity::Edge18`]): 面相邻或棱相邻的体素视为连通, 仅角相邻的不连通.
//! 6-邻接会把斜向走行的细肋骨在对角接触处切成许多碎片;
//! 26-邻接则容易把在角点处相互接触的相邻两根肋骨合并为一个分量.
//! 该选择会直接影响输出的分量个数, 因此对外可见且可配置.

use crate::consts::canonical::is_background;
use crate::{Budget, Idx3d, LabelVolume, Point3, Result};
use ndarray::{Array3, ArrayView3};
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `(dz, dh, dw)` 偏移量.
type Offset = (isize, isize, isize);

/// BFS 中每弹出这么多个体素检查一次预算.
const BUDGET_CHECK_MASK: usize = 0xFFFF;

/// 三种邻接规则对应的偏移量表. 非零分量个数分别至多为 1, 2, 3.
static OFFSETS: Lazy<[Vec<Offset>; 3]> = Lazy::new(|| {
    let mut ans: [Vec<Offset>; 3] = Default::default();
    for dz in -1..=1isize {
        for dh in -1..=1isize {
            for dw in -1..=1isize {
                let nonzero = [dz, dh, dw].iter().filter(|d| **d != 0).count();
                if nonzero == 0 {
                    continue;
                }
                for (table, max) in ans.iter_mut().zip(1..=3) {
                    if nonzero <= max {
                        table.push((dz, dh, dw));
                    }
                }
            }
        }
    }
    ans
});

/// 体素邻接规则.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// 6-邻接, 仅面相邻. 误合并最少, 碎片最多.
    Face6,

    /// 18-邻接, 面或棱相邻. 默认值.
    #[default]
    Edge18,

    /// 26-邻接, 面, 棱或角相邻. 碎片最少, 最容易合并相邻肋骨.
    Vertex26,
}

impl Connectivity {
    /// 邻居偏移量表.
    #[inline]
    pub fn offsets(&self) -> &'static [Offset] {
        let i = match self {
            Connectivity::Face6 => 0,
            Connectivity::Edge18 => 1,
            Connectivity::Vertex26 => 2,
        };
        &OFFSETS[i]
    }
}

/// 分量提取方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExtractMode {
    /// 对每个前景标签值分别求连通分量. 不同标签的体素即使相邻也不连通.
    #[default]
    PerLabel,

    /// 将所有前景视为同一个标签. 分量的来源标签取其中出现最多的标签值.
    Foreground,
}

/// 轴对齐包围盒, `(z, h, w)` 格式, 两端均包含.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    /// 最小角.
    pub min: Idx3d,
    /// 最大角.
    pub max: Idx3d,
}

impl BoundingBox {
    #[inline]
    fn new(pos: Idx3d) -> Self {
        Self { min: pos, max: pos }
    }

    #[inline]
    fn include(&mut self, (z, h, w): Idx3d) {
        self.min = (self.min.0.min(z), self.min.1.min(h), self.min.2.min(w));
        self.max = (self.max.0.max(z), self.max.1.max(h), self.max.2.max(w));
    }

    /// 包围盒的尺寸 (体素个数).
    #[inline]
    pub fn dim(&self) -> Idx3d {
        (
            self.max.0 - self.min.0 + 1,
            self.max.1 - self.min.1 + 1,
            self.max.2 - self.min.2 + 1,
        )
    }

    /// 向各方向扩张 `r` 个体素, 并截断到 `shape` 之内.
    pub fn expand(&self, r: usize, shape: Idx3d) -> Self {
        let hi = |v: usize, n: usize| v.saturating_add(r).min(n.saturating_sub(1));
        Self {
            min: (
                self.min.0.saturating_sub(r),
                self.min.1.saturating_sub(r),
                self.min.2.saturating_sub(r),
            ),
            max: (
                hi(self.max.0, shape.0),
                hi(self.max.1, shape.1),
                hi(self.max.2, shape.2),
            ),
        }
    }
}

/// 一个连通分量.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Component {
    id: u32,
    label: u8,
    voxels: usize,
    centroid_index: [f64; 3],
    centroid: Point3,
    bbox: BoundingBox,
}

impl Component {
    /// arena id, 从 1 开始.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 来源标签值.
    #[inline]
    pub fn label(&self) -> u8 {
        self.label
    }

    /// 体素个数.
    #[inline]
    pub fn voxels(&self) -> usize {
        self.voxels
    }

    /// `(z, h, w)` 体素索引空间中的质心.
    #[inline]
    pub fn centroid_index(&self) -> [f64; 3] {
        self.centroid_index
    }

    /// 物理空间中的质心 `[x, y, z]` (毫米).
    #[inline]
    pub fn centroid(&self) -> Point3 {
        self.centroid
    }

    /// 包围盒.
    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// 输出顺序的排序键: 体素数降序, 物理 x 升序, 物理 z 升序, id 升序.
    #[inline]
    pub(crate) fn rank_key(&self) -> (Reverse<usize>, OrderedFloat<f64>, OrderedFloat<f64>, u32) {
        (
            Reverse(self.voxels),
            OrderedFloat(self.centroid[0]),
            OrderedFloat(self.centroid[2]),
            self.id,
        )
    }
}

/// 单个分量在 BFS 过程中的累加器.
struct Accumulator {
    voxels: usize,
    sum: [u64; 3],
    bbox: BoundingBox,
    histogram: [usize; 256],
}

impl Accumulator {
    fn new(seed: Idx3d) -> Self {
        Self {
            voxels: 0,
            sum: [0; 3],
            bbox: BoundingBox::new(seed),
            histogram: [0; 256],
        }
    }

    #[inline]
    fn push(&mut self, pos @ (z, h, w): Idx3d, label: u8) {
        self.voxels += 1;
        self.sum[0] += z as u64;
        self.sum[1] += h as u64;
        self.sum[2] += w as u64;
        self.bbox.include(pos);
        self.histogram[label as usize] += 1;
    }

    fn finish(self, id: u32, seed_label: u8, mode: ExtractMode, volume: &LabelVolume) -> Component {
        debug_assert!(self.voxels >= 1);
        let n = self.voxels as f64;
        let centroid_index = self.sum.map(|s| s as f64 / n);
        let label = match mode {
            ExtractMode::PerLabel => seed_label,
            // 出现次数最多的标签, 并列时取较小值.
            ExtractMode::Foreground => {
                let mut best = 0u8;
                for (l, c) in self.histogram.iter().enumerate().skip(1) {
                    if *c > self.histogram[best as usize] {
                        best = l as u8;
                    }
                }
                best
            }
        };
        Component {
            id,
            label,
            voxels: self.voxels,
            centroid_index,
            centroid: volume.affine().index_to_physical(centroid_index),
            bbox: self.bbox,
        }
    }
}

/// 一次提取的全部结果: 分量 arena, id 图和输出顺序.
#[derive(Clone, Debug)]
pub struct Components {
    map: Array3<u32>,
    arena: Vec<Component>,
    order: Vec<u32>,
    connectivity: Connectivity,
    mode: ExtractMode,
}

impl Components {
    /// 分量个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// 是否没有任何分量 (体数据全为背景)?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// 按输出顺序 (体素数降序, 物理 x 升序, 物理 z 升序) 迭代所有分量.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Component> + '_ {
        self.order.iter().map(|id| &self.arena[*id as usize - 1])
    }

    /// 通过 arena id 获取分量.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&Component> {
        (id as usize).checked_sub(1).and_then(|i| self.arena.get(i))
    }

    /// 体素到分量 id 的映射. `0` 表示背景.
    #[inline]
    pub fn id_map(&self) -> ArrayView3<'_, u32> {
        self.map.view()
    }

    /// 来源标签为 `label` 的所有分量, 按输出顺序.
    pub fn of_label(&self, label: u8) -> impl Iterator<Item = &Component> + '_ {
        self.iter().filter(move |c| c.label == label)
    }

    /// 最大的分量.
    #[inline]
    pub fn largest(&self) -> Option<&Component> {
        self.iter().next()
    }

    /// 提取时使用的邻接规则.
    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// 提取方式.
    #[inline]
    pub fn mode(&self) -> ExtractMode {
        self.mode
    }
}

/// 连通分量提取器. 只持有只读配置, 可以在线程间共享.
#[derive(Copy, Clone, Debug, Default)]
pub struct Extractor {
    connectivity: Connectivity,
    mode: ExtractMode,
}

impl Extractor {
    /// 创建提取器.
    #[inline]
    pub fn new(connectivity: Connectivity, mode: ExtractMode) -> Self {
        Self { connectivity, mode }
    }

    /// 提取 `volume` 的所有连通分量.
    ///
    /// # 返回值
    ///
    /// - 仿射矩阵不可用时返回 `Err(Error::InvalidGeometry)`;
    /// - 全背景时返回空结果, 而不是错误.
    #[inline]
    pub fn extract(&self, volume: &LabelVolume) -> Result<Components> {
        self.extract_with_budget(volume, &Budget::unlimited())
    }

    /// 同 [`Self::extract`], 但在每个水平切片之前以及 BFS 过程中定期检查 `budget`.
    pub fn extract_with_budget(&self, volume: &LabelVolume, budget: &Budget) -> Result<Components> {
        volume.affine().validate()?;

        let shape = volume.shape();
        let data = volume.data();
        let offsets = self.connectivity.offsets();
        let mut map = Array3::<u32>::zeros(shape);
        let mut arena = Vec::new();
        let mut queue = VecDeque::with_capacity(1024);
        let mut popped = 0usize;

        for z in 0..shape.0 {
            budget.check()?;
            for h in 0..shape.1 {
                for w in 0..shape.2 {
                    let seed = (z, h, w);
                    let seed_label = data[seed];
                    if is_background(seed_label) || map[seed] != 0 {
                        continue;
                    }

                    debug_assert!(arena.len() < u32::MAX as usize);
                    let id = arena.len() as u32 + 1;
                    let mut acc = Accumulator::new(seed);
                    map[seed] = id;
                    queue.push_back(seed);

                    while let Some(pos) = queue.pop_front() {
                        popped += 1;
                        if popped & BUDGET_CHECK_MASK == 0 {
                            budget.check()?;
                        }
                        acc.push(pos, data[pos]);

                        for &d in offsets {
                            let Some(next) = LabelVolume::offset(pos, d, shape) else {
                                continue;
                            };
                            if map[next] == 0 && self.joins(seed_label, data[next]) {
                                map[next] = id;
                                queue.push_back(next);
                            }
                        }
                    }
                    arena.push(acc.finish(id, seed_label, self.mode, volume));
                }
            }
        }

        let mut order: Vec<u32> = arena.iter().map(Component::id).collect();
        order.sort_by_key(|id| arena[*id as usize - 1].rank_key());

        log::debug!(
            "extracted {} components ({:?}, {:?})",
            arena.len(),
            self.connectivity,
            self.mode
        );
        Ok(Components {
            map,
            arena,
            order,
            connectivity: self.connectivity,
            mode: self.mode,
        })
    }

    /// 邻居体素是否与种子属于同一分量?
    #[inline]
    fn joins(&self, seed_label: u8, p: u8) -> bool {
        match self.mode {
            ExtractMode::PerLabel => p == seed_label,
            ExtractMode::Foreground => !is_background(p),
        }
    }
}

/// 按 `connectivity` 对每个前景标签分别提取连通分量.
#[inline]
pub fn extract(volume: &LabelVolume, connectivity: Connectivity) -> Result<Components> {
    Extractor::new(connectivity, ExtractMode::PerLabel).extract(volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Affine, CancelToken, Error, GeometryDefect};
    use ndarray::s;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn volume(data: Array3<u8>) -> LabelVolume {
        LabelVolume::new(data, Affine::identity())
    }

    #[test]
    fn test_offset_tables() {
        assert_eq!(Connectivity::Face6.offsets().len(), 6);
        assert_eq!(Connectivity::Edge18.offsets().len(), 18);
        assert_eq!(Connectivity::Vertex26.offsets().len(), 26);
        assert_eq!(Connectivity::default(), Connectivity::Edge18);
    }

    #[test]
    fn test_empty_volume() {
        let v = volume(Array3::zeros((3, 4, 5)));
        let c = extract(&v, Connectivity::default()).unwrap();
        assert!(c.is_empty());
        assert!(c.largest().is_none());
    }

    /// 对随机体数据, 每个标签的分量体素数之和等于该标签的体素总数, 且 id 图与标签一一对应.
    #[test]
    fn test_partition_random_volume() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = Array3::from_shape_fn((6, 7, 8), |_| {
            if rng.random_bool(0.45) {
                rng.random_range(1..=3u8)
            } else {
                0
            }
        });
        let v = volume(data);

        for conn in [
            Connectivity::Face6,
            Connectivity::Edge18,
            Connectivity::Vertex26,
        ] {
            let c = extract(&v, conn).unwrap();
            let mut sums = BTreeMap::new();
            for comp in c.iter() {
                *sums.entry(comp.label()).or_insert(0) += comp.voxels();
            }
            assert_eq!(sums, v.label_counts());

            for (pos, &id) in c.id_map().indexed_iter() {
                if v[pos] == 0 {
                    assert_eq!(id, 0);
                } else {
                    assert_eq!(c.get(id).unwrap().label(), v[pos]);
                }
            }
        }
    }

    #[test]
    fn test_connectivity_rules() {
        // 棱相邻.
        let mut data = Array3::<u8>::zeros((1, 3, 3));
        data[(0, 0, 0)] = 1;
        data[(0, 1, 1)] = 1;
        let v = volume(data);
        assert_eq!(extract(&v, Connectivity::Face6).unwrap().len(), 2);
        assert_eq!(extract(&v, Connectivity::Edge18).unwrap().len(), 1);

        // 角相邻.
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 1;
        data[(1, 1, 1)] = 1;
        let v = volume(data);
        assert_eq!(extract(&v, Connectivity::Edge18).unwrap().len(), 2);
        assert_eq!(extract(&v, Connectivity::Vertex26).unwrap().len(), 1);
    }

    #[test]
    fn test_order_and_statistics() {
        let mut data = Array3::<u8>::zeros((4, 4, 10));
        // 两个同样大小的块, 物理 x 较大者排在后面.
        data.slice_mut(s![0..2, 0..2, 7..9]).fill(2);
        data.slice_mut(s![0..2, 0..2, 1..3]).fill(2);
        // 最大的块.
        data.slice_mut(s![2..4, 0..4, 4..6]).fill(5);
        let v = LabelVolume::new(data, Affine::from_spacing([2.0, 1.0, 3.0], [0.0; 3]));

        let c = extract(&v, Connectivity::Face6).unwrap();
        let order: Vec<_> = c.iter().map(|c| (c.label(), c.voxels())).collect();
        assert_eq!(order, vec![(5, 16), (2, 8), (2, 8)]);

        let xs: Vec<_> = c.iter().map(|c| c.centroid()[0]).collect();
        assert!((xs[1] - 3.0).abs() < 1e-9);
        assert!((xs[2] - 15.0).abs() < 1e-9);

        let big = c.largest().unwrap();
        assert_eq!(big.centroid_index(), [2.5, 1.5, 4.5]);
        assert!((big.centroid()[2] - 7.5).abs() < 1e-9);
        assert_eq!(big.bbox().dim(), (2, 4, 2));
        assert_eq!(c.of_label(2).count(), 2);
    }

    /// 体素数与物理 x 都相同时, 物理 z 较小的分量排在前面, 与扫描顺序 (id) 无关.
    #[test]
    fn test_order_tie_broken_by_physical_z() {
        let mut data = Array3::<u8>::zeros((6, 2, 2));
        data.slice_mut(s![0..2, .., ..]).fill(3);
        data.slice_mut(s![4..6, .., ..]).fill(3);
        // z 轴反向: 先扫描到的块物理 z 更大.
        let v = LabelVolume::new(data, Affine::from_spacing([1.0, 1.0, -2.0], [0.0; 3]));

        let c = extract(&v, Connectivity::Face6).unwrap();
        assert_eq!(c.len(), 2);
        let zs: Vec<_> = c.iter().map(|c| c.centroid()[2]).collect();
        assert!((zs[0] + 9.0).abs() < 1e-9);
        assert!((zs[1] + 1.0).abs() < 1e-9);
        let ids: Vec<_> = c.iter().map(|c| c.id()).collect();
        assert!(ids[0] > ids[1]);
    }

    #[test]
    fn test_foreground_mode_majority_label() {
        let mut data = Array3::<u8>::zeros((1, 1, 5));
        data[(0, 0, 0)] = 4;
        data[(0, 0, 1)] = 9;
        data[(0, 0, 2)] = 9;
        data[(0, 0, 4)] = 4;
        let v = volume(data);

        let per_label = extract(&v, Connectivity::Face6).unwrap();
        assert_eq!(per_label.len(), 3);

        let fg = Extractor::new(Connectivity::Face6, ExtractMode::Foreground)
            .extract(&v)
            .unwrap();
        assert_eq!(fg.len(), 2);
        let first = fg.largest().unwrap();
        assert_eq!((first.label(), first.voxels()), (9, 3));
    }

    #[test]
    fn test_invalid_geometry() {
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 1;
        let v = LabelVolume::new(data, Affine::from_spacing([1.0, 0.0, 1.0], [0.0; 3]));
        assert!(matches!(
            extract(&v, Connectivity::default()),
            Err(Error::InvalidGeometry(GeometryDefect::Singular(_)))
        ));
    }

    #[test]
    fn test_cancelled_extraction() {
        let mut data = Array3::<u8>::zeros((3, 3, 3));
        data[(1, 1, 1)] = 1;
        let token = CancelToken::new();
        token.cancel();
        let budget = Budget::new(None, Some(token));
        let r = Extractor::default().extract_with_budget(&volume(data), &budget);
        assert_eq!(r.err(), Some(Error::Cancelled));
    }

    #[test]
    fn test_bbox_expand() {
        let b = BoundingBox {
            min: (0, 2, 3),
            max: (1, 4, 9),
        };
        let e = b.expand(2, (3, 6, 10));
        assert_eq!(e.min, (0, 0, 1));
        assert_eq!(e.max, (2, 5, 9));
    }
}
