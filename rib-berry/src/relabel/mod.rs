//! 解剖学排序与重标注.
//!
//! 流程:
//!
//! 1. 去噪: 只保留体素数最多的 `keep` 个分量, 其余写为背景;
//! 2. 辅助结构: 来源标签被配置为辅助结构 (例如胸骨) 的分量直接获得其标准标签,
//!   每个辅助标签只保留最大的一个分量;
//! 3. 侧别划分: 其余分量按物理 x 质心与中线的相对位置分为左右两侧,
//!   每侧最多 `ribs_per_side` 个, 超出部分无法分配;
//! 4. 上下排序: 每侧按物理 z 质心降序 (自上而下) 排列;
//! 5. 分配标签: 右侧第 r 个 -> `r`, 左侧第 r 个 -> `12 + r`;
//! 6. 输出: 生成新的体数据, 可选地对每个标签做闭运算.

use crate::components::{Component, Components, Connectivity, ExtractMode, Extractor};
use crate::consts::canonical::{self, is_background, RIBS_PER_SIDE};
use crate::consts::{Side, AMBIGUITY_MM};
use crate::taxonomy::Taxonomy;
use crate::{Budget, Frame, LabelVolume, Result};
use ndarray::{Array3, Zip};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod closing;
mod side;

pub use side::{side_of, Midline};

/// 一个辅助结构: 输入中已经区分好的标签, 以及它在输出中的标准标签.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuxiliaryLabel {
    /// 输入中的来源标签.
    pub input: u8,
    /// 输出中的标准标签.
    pub output: u8,
}

impl AuxiliaryLabel {
    /// 创建辅助结构映射.
    #[inline]
    pub const fn new(input: u8, output: u8) -> Self {
        Self { input, output }
    }
}

#[inline]
fn default_ribs_per_side() -> usize {
    RIBS_PER_SIDE
}

#[inline]
fn default_ambiguity_mm() -> f64 {
    AMBIGUITY_MM
}

/// 重标注配置. 除 `keep` 外所有字段都有默认值.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelabelConfig {
    /// 保留的最大分量个数 K.
    pub keep: usize,

    /// 每侧最多分配的肋骨数. 超过 12 时按 12 处理.
    #[cfg_attr(feature = "serde", serde(default = "default_ribs_per_side"))]
    pub ribs_per_side: usize,

    /// 中线位置.
    #[cfg_attr(feature = "serde", serde(default))]
    pub midline: Midline,

    /// 物理坐标系约定.
    #[cfg_attr(feature = "serde", serde(default))]
    pub frame: Frame,

    /// 质心距中线小于该值 (毫米) 的分量会被标注为侧别可疑. 仅产生警告, 不影响分配.
    #[cfg_attr(feature = "serde", serde(default = "default_ambiguity_mm"))]
    pub ambiguity_mm: f64,

    /// 连通分量的邻接规则.
    #[cfg_attr(feature = "serde", serde(default))]
    pub connectivity: Connectivity,

    /// 分量提取方式.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mode: ExtractMode,

    /// 辅助结构.
    #[cfg_attr(feature = "serde", serde(default))]
    pub auxiliary: Vec<AuxiliaryLabel>,

    /// `Foreground` 模式下分配给中线附近分量的保留标签, 按分量大小依次分配.
    #[cfg_attr(feature = "serde", serde(default))]
    pub midline_structures: Vec<u8>,

    /// 闭运算半径 (体素). `0` 表示不做闭运算.
    #[cfg_attr(feature = "serde", serde(default))]
    pub closing: usize,
}

impl RelabelConfig {
    /// 保留 `keep` 个分量, 其余字段取默认值.
    pub fn new(keep: usize) -> Self {
        Self {
            keep,
            ribs_per_side: RIBS_PER_SIDE,
            midline: Midline::default(),
            frame: Frame::default(),
            ambiguity_mm: AMBIGUITY_MM,
            connectivity: Connectivity::default(),
            mode: ExtractMode::default(),
            auxiliary: vec![],
            midline_structures: vec![],
            closing: 0,
        }
    }

    /// 完整胸廓: 保留 26 个分量, 胸骨与肋软骨作为辅助结构原样保留.
    pub fn ribcage() -> Self {
        Self::new(canonical::RIB_COUNT + 2).with_auxiliary(vec![
            AuxiliaryLabel::new(canonical::STERNUM, canonical::STERNUM),
            AuxiliaryLabel::new(canonical::COSTAL_CARTILAGE, canonical::COSTAL_CARTILAGE),
        ])
    }

    /// 设置每侧肋骨数.
    pub fn with_ribs_per_side(mut self, n: usize) -> Self {
        self.ribs_per_side = n;
        self
    }

    /// 设置中线.
    pub fn with_midline(mut self, midline: Midline) -> Self {
        self.midline = midline;
        self
    }

    /// 设置坐标系.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    /// 设置中线歧义距离.
    pub fn with_ambiguity_mm(mut self, mm: f64) -> Self {
        self.ambiguity_mm = mm;
        self
    }

    /// 设置邻接规则.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// 设置提取方式.
    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置辅助结构.
    pub fn with_auxiliary(mut self, auxiliary: Vec<AuxiliaryLabel>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    /// 设置中线结构的保留标签.
    pub fn with_midline_structures(mut self, labels: Vec<u8>) -> Self {
        self.midline_structures = labels;
        self
    }

    /// 设置闭运算半径.
    pub fn with_closing(mut self, radius: usize) -> Self {
        self.closing = radius;
        self
    }

    #[inline]
    fn ribs_per_side(&self) -> usize {
        self.ribs_per_side.min(RIBS_PER_SIDE)
    }

    /// `label` 作为辅助结构时对应的标准标签.
    #[inline]
    fn auxiliary_output(&self, label: u8) -> Option<u8> {
        self.auxiliary
            .iter()
            .find(|a| a.input == label)
            .map(|a| a.output)
    }
}

/// 重标注过程中值得注意, 但不构成错误的情况.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Warning {
    /// 分量质心距中线过近, 侧别可疑.
    AmbiguousSide {
        /// 分量 id.
        component: u32,
        /// 质心相对中线的物理 x 偏移 (毫米).
        offset_mm: f64,
        /// 最终分配的标准标签. 无法分配时为 `None`.
        canonical: Option<u8>,
    },

    /// 一侧候选分量超过每侧肋骨数, 该分量无法分配.
    ExcessOnSide {
        /// 侧别.
        side: Side,
        /// 分量 id.
        component: u32,
        /// 分量体素数.
        voxels: usize,
    },

    /// 同一辅助标签出现多个分量, 除最大者外均被丢弃.
    DuplicateAuxiliary {
        /// 来源标签.
        label: u8,
        /// 被丢弃的分量 id.
        component: u32,
        /// 被丢弃的分量体素数.
        voxels: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::AmbiguousSide {
                component,
                offset_mm,
                canonical,
            } => {
                write!(f, "component #{component} is {offset_mm:+.2} mm from the midline")?;
                match canonical {
                    Some(l) => write!(f, " (assigned {l})"),
                    None => write!(f, " (unassigned)"),
                }
            }
            Warning::ExcessOnSide {
                side,
                component,
                voxels,
            } => write!(
                f,
                "component #{component} ({voxels} voxels) exceeds the {} side capacity",
                side.name()
            ),
            Warning::DuplicateAuxiliary {
                label,
                component,
                voxels,
            } => write!(
                f,
                "extra component #{component} ({voxels} voxels) of auxiliary label {label} dropped"
            ),
        }
    }
}

/// 一次成功的标签分配.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Assignment {
    /// 标准标签.
    pub canonical: u8,
    /// 获得该标签的分量.
    pub component: Component,
}

/// 重标注结果.
#[derive(Clone, Debug)]
pub struct Relabeled {
    volume: LabelVolume,
    assigned: Vec<Assignment>,
    unassigned: Vec<Component>,
    discarded: usize,
    warnings: Vec<Warning>,
    midline_x: f64,
}

impl Relabeled {
    /// 重标注后的体数据.
    #[inline]
    pub fn volume(&self) -> &LabelVolume {
        &self.volume
    }

    /// 消费自我, 获得重标注后的体数据.
    #[inline]
    pub fn into_volume(self) -> LabelVolume {
        self.volume
    }

    /// 所有分配, 按标准标签升序.
    #[inline]
    pub fn assigned(&self) -> &[Assignment] {
        &self.assigned
    }

    /// 被保留但无法分配的分量 (一侧超额), 它们在输出中为背景.
    #[inline]
    pub fn unassigned(&self) -> &[Component] {
        &self.unassigned
    }

    /// 作为噪声丢弃的分量个数 (包括多余的辅助结构分量).
    #[inline]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// 警告.
    #[inline]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// 实际使用的中线物理 x 坐标.
    #[inline]
    pub fn midline_x(&self) -> f64 {
        self.midline_x
    }

    /// 获取标准标签 `canonical` 对应的分量.
    pub fn component_of(&self, canonical: u8) -> Option<&Component> {
        self.assigned
            .binary_search_by_key(&canonical, |a| a.canonical)
            .ok()
            .map(|i| &self.assigned[i].component)
    }

    /// `taxonomy` 中没有被分配的标签, 升序.
    pub fn missing_from(&self, taxonomy: &Taxonomy) -> Vec<u8> {
        taxonomy
            .labels()
            .filter(|l| self.component_of(*l).is_none())
            .collect()
    }
}

/// 重标注器. 只借用配置, 可以在线程间共享.
#[derive(Copy, Clone, Debug)]
pub struct Relabeler<'a> {
    config: &'a RelabelConfig,
}

impl<'a> Relabeler<'a> {
    /// 以 `config` 创建重标注器.
    #[inline]
    pub fn new(config: &'a RelabelConfig) -> Self {
        Self { config }
    }

    /// 获取配置.
    #[inline]
    pub fn config(&self) -> &RelabelConfig {
        self.config
    }

    /// 对 `volume` 重标注.
    #[inline]
    pub fn relabel(&self, volume: &LabelVolume) -> Result<Relabeled> {
        self.relabel_with_budget(volume, &Budget::unlimited())
    }

    /// 同 [`Self::relabel`], 但受 `budget` 约束.
    pub fn relabel_with_budget(&self, volume: &LabelVolume, budget: &Budget) -> Result<Relabeled> {
        let components = Extractor::new(self.config.connectivity, self.config.mode)
            .extract_with_budget(volume, budget)?;
        budget.check()?;
        self.relabel_components(volume, &components, budget)
    }

    /// 在已经提取好的分量上重标注. `components` 必须提取自 `volume`.
    pub fn relabel_components(
        &self,
        volume: &LabelVolume,
        components: &Components,
        budget: &Budget,
    ) -> Result<Relabeled> {
        let cfg = self.config;
        let midline_x = cfg.midline.resolve(volume);
        let mut warnings = vec![];
        let mut assigned: Vec<Assignment> = vec![];

        // 1. 去噪.
        let kept: Vec<&Component> = components.iter().take(cfg.keep).collect();
        let mut discarded = components.len() - kept.len();

        // 2. 辅助结构与中线结构.
        let mut seen_aux = BTreeSet::new();
        let mut rest = vec![];
        for c in kept {
            match cfg.auxiliary_output(c.label()) {
                Some(out) if seen_aux.insert(c.label()) && !claimed_contains(&assigned, out) => {
                    claim(&mut assigned, out, c);
                }
                Some(_) => {
                    discarded += 1;
                    warnings.push(Warning::DuplicateAuxiliary {
                        label: c.label(),
                        component: c.id(),
                        voxels: c.voxels(),
                    });
                }
                None => rest.push(c),
            }
        }
        if cfg.mode == ExtractMode::Foreground && !cfg.midline_structures.is_empty() {
            let reserved: Vec<u8> = cfg
                .midline_structures
                .iter()
                .copied()
                .filter(|l| !is_background(*l) && !claimed_contains(&assigned, *l))
                .collect();
            let mut reserved = reserved.into_iter();
            let mut others = vec![];
            for c in rest {
                let near = (c.centroid()[0] - midline_x).abs() < cfg.ambiguity_mm;
                match near.then(|| reserved.next()).flatten() {
                    Some(l) => claim(&mut assigned, l, c),
                    None => others.push(c),
                }
            }
            rest = others;
        }

        // 3. 侧别划分.
        let mut split = side::split(rest, midline_x, cfg.frame, cfg.ambiguity_mm);
        let mut unassigned = vec![];
        for s in [Side::Right, Side::Left] {
            let candidates = split.side_mut(s);
            if candidates.len() > cfg.ribs_per_side() {
                for c in candidates.drain(cfg.ribs_per_side()..) {
                    log::warn!("{} side over capacity, component #{} dropped", s.name(), c.id());
                    warnings.push(Warning::ExcessOnSide {
                        side: s,
                        component: c.id(),
                        voxels: c.voxels(),
                    });
                    unassigned.push(c.clone());
                }
            }

            // 4. 上下排序, 5. 分配标签.
            side::sort_superior_first(candidates);
            for (rank, c) in candidates.iter().enumerate() {
                match canonical::rib(s, rank + 1) {
                    Some(l) if !claimed_contains(&assigned, l) => claim(&mut assigned, l, c),
                    _ => unassigned.push((*c).clone()),
                }
            }
        }
        assigned.sort_by_key(|a| a.canonical);

        for (c, offset_mm) in split.ambiguous {
            let canonical = assigned
                .iter()
                .find(|a| a.component.id() == c.id())
                .map(|a| a.canonical);
            log::warn!("component #{} lies {:+.2} mm from the midline", c.id(), offset_mm);
            warnings.push(Warning::AmbiguousSide {
                component: c.id(),
                offset_mm,
                canonical,
            });
        }

        // 6. 输出.
        budget.check()?;
        let data = self.emit(volume, components, &assigned, budget)?;
        log::debug!(
            "relabel: {} assigned, {} unassigned, {} discarded",
            assigned.len(),
            unassigned.len(),
            discarded
        );

        Ok(Relabeled {
            volume: volume.with_data(data),
            assigned,
            unassigned,
            discarded,
            warnings,
            midline_x,
        })
    }

    /// 通过 "分量 id -> 标准标签" 查找表生成新的标签数组.
    fn emit(
        &self,
        volume: &LabelVolume,
        components: &Components,
        assigned: &[Assignment],
        budget: &Budget,
    ) -> Result<Array3<u8>> {
        let mut lut = vec![canonical::BACKGROUND; components.len() + 1];
        for a in assigned {
            lut[a.component.id() as usize] = a.canonical;
        }

        let mut data = Array3::<u8>::zeros(volume.shape());
        fill_from_lut(&mut data, components, &lut);

        if self.config.closing > 0 {
            for a in assigned {
                budget.check()?;
                let filled = closing::close_label(
                    &mut data,
                    a.canonical,
                    self.config.closing,
                    a.component.bbox(),
                );
                if filled > 0 {
                    log::debug!("closing filled {filled} voxels of label {}", a.canonical);
                }
            }
        }
        Ok(data)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 借助 `rayon`, 并行地按查找表写入标签.
        fn fill_from_lut(data: &mut Array3<u8>, components: &Components, lut: &[u8]) {
            Zip::from(data)
                .and(components.id_map())
                .par_for_each(|p, id| *p = lut[*id as usize]);
        }
    } else {
        fn fill_from_lut(data: &mut Array3<u8>, components: &Components, lut: &[u8]) {
            Zip::from(data)
                .and(components.id_map())
                .for_each(|p, id| *p = lut[*id as usize]);
        }
    }
}

#[inline]
fn claim(assigned: &mut Vec<Assignment>, canonical: u8, component: &Component) {
    assigned.push(Assignment {
        canonical,
        component: component.clone(),
    });
}

#[inline]
fn claimed_contains(assigned: &[Assignment], canonical: u8) -> bool {
    assigned.iter().any(|a| a.canonical == canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::canonical::*;
    use crate::Affine;
    use ndarray::s;

    /// 宽 40 的体数据 (RAS, 单位仿射), 中线 x = 19.5. 右侧为 w 较大的一侧.
    fn blank() -> Array3<u8> {
        Array3::zeros((12, 4, 40))
    }

    fn volume(data: Array3<u8>) -> LabelVolume {
        LabelVolume::new(data, Affine::identity())
    }

    /// 右上, 右下, 左上, 左下四根 "肋骨" 和两个噪声点.
    fn four_ribs(labels: [u8; 4]) -> Array3<u8> {
        let mut data = blank();
        data.slice_mut(s![8..11, 1..3, 28..36]).fill(labels[0]);
        data.slice_mut(s![2..5, 1..3, 27..34]).fill(labels[1]);
        data.slice_mut(s![8..11, 1..3, 4..12]).fill(labels[2]);
        data.slice_mut(s![2..5, 1..3, 5..11]).fill(labels[3]);
        data[(0, 0, 0)] = 7;
        data[(6, 3, 20)] = 9;
        data
    }

    #[test]
    fn test_two_blobs_keep_two() {
        let mut data = blank();
        data.slice_mut(s![4..8, 1..3, 30..35]).fill(5);
        data.slice_mut(s![4..8, 1..3, 5..10]).fill(5);
        data[(0, 0, 0)] = 5;
        data[(11, 3, 39)] = 2;
        let v = volume(data);

        let cfg = RelabelConfig::new(2);
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        let out = r.volume();
        assert_eq!(out[(5, 2, 32)], RIB_RIGHT_FIRST);
        assert_eq!(out[(5, 2, 7)], RIB_LEFT_FIRST);
        assert_eq!(out[(0, 0, 0)], BACKGROUND);
        assert_eq!(out[(11, 3, 39)], BACKGROUND);
        assert_eq!(r.discarded(), 2);
        assert_eq!(r.assigned().len(), 2);

        let missing = r.missing_from(&Taxonomy::ribs_only());
        assert_eq!(missing.len(), 22);
        assert!(!missing.contains(&1) && !missing.contains(&13));
    }

    #[test]
    fn test_scrambled_labels_are_reordered() {
        // 左右互换, 上下颠倒.
        let v = volume(four_ribs([14, 13, 2, 1]));
        let cfg = RelabelConfig::new(4);
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        let out = r.volume();
        assert_eq!(out[(9, 2, 30)], 1);
        assert_eq!(out[(3, 2, 30)], 2);
        assert_eq!(out[(9, 2, 6)], 13);
        assert_eq!(out[(3, 2, 6)], 14);
        assert!(r.warnings().is_empty());
    }

    #[test]
    fn test_idempotent_on_canonical_volume() {
        let v = volume(four_ribs([1, 2, 13, 14]));
        let cfg = RelabelConfig::new(4);
        let relabeler = Relabeler::new(&cfg);
        let once = relabeler.relabel(&v).unwrap().into_volume();
        let twice = relabeler.relabel(&once).unwrap().into_volume();
        assert_eq!(once.data(), twice.data());

        // 噪声之外与输入完全一致.
        let mut expected = v.into_data();
        expected[(0, 0, 0)] = 0;
        expected[(6, 3, 20)] = 0;
        assert_eq!(once.data(), expected.view());
    }

    #[test]
    fn test_lps_frame_swaps_sides() {
        let v = volume(four_ribs([1, 2, 13, 14]));
        let cfg = RelabelConfig::new(4).with_frame(Frame::Lps);
        let out = Relabeler::new(&cfg).relabel(&v).unwrap().into_volume();
        assert_eq!(out[(9, 2, 30)], 13);
        assert_eq!(out[(9, 2, 6)], 1);
    }

    #[test]
    fn test_excess_on_one_side() {
        let mut data = blank();
        data.slice_mut(s![0..3, .., 25..35]).fill(1);
        data.slice_mut(s![4..7, .., 25..34]).fill(1);
        data.slice_mut(s![8..10, .., 25..30]).fill(1);
        let v = volume(data);

        let cfg = RelabelConfig::new(10).with_ribs_per_side(2);
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        assert_eq!(r.unassigned().len(), 1);
        assert_eq!(r.unassigned()[0].voxels(), 40);
        assert!(matches!(
            r.warnings(),
            [Warning::ExcessOnSide {
                side: Side::Right,
                voxels: 40,
                ..
            }]
        ));
        let out = r.volume();
        assert_eq!(out[(9, 0, 26)], BACKGROUND);
        assert_eq!(out[(5, 0, 26)], 1);
        assert_eq!(out[(1, 0, 26)], 2);

        // 全部在同一侧: 左侧整体缺失.
        let missing = r.missing_from(&Taxonomy::ribs_only());
        assert!((RIB_LEFT_FIRST..=RIB_LEFT_LAST).all(|l| missing.contains(&l)));
    }

    #[test]
    fn test_auxiliary_keeps_largest_only() {
        let mut data = four_ribs([3, 3, 3, 3]);
        data.slice_mut(s![3..10, 0..2, 18..22]).fill(STERNUM);
        data.slice_mut(s![0..2, 3, 18..20]).fill(STERNUM);
        let v = volume(data);

        let cfg = RelabelConfig::ribcage();
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        assert_eq!(r.component_of(STERNUM).map(Component::voxels), Some(56));
        assert_eq!(r.volume().count(STERNUM), 56);
        assert_eq!(r.volume()[(0, 3, 18)], BACKGROUND);
        assert!(r
            .warnings()
            .iter()
            .any(|w| matches!(w, Warning::DuplicateAuxiliary { label: STERNUM, voxels: 4, .. })));
        // 胸骨不参与侧别划分.
        assert_eq!(r.component_of(1).map(Component::voxels), Some(48));
        assert!(r.component_of(COSTAL_CARTILAGE).is_none());
    }

    #[test]
    fn test_ambiguous_side_is_only_a_warning() {
        let mut data = blank();
        data.slice_mut(s![2..5, .., 18..23]).fill(1);
        let v = volume(data);
        let cfg = RelabelConfig::new(1);
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        // x = 20 > 19.5, 右侧.
        assert_eq!(r.volume()[(3, 0, 20)], 1);
        assert!(matches!(
            r.warnings(),
            [Warning::AmbiguousSide {
                canonical: Some(1),
                ..
            }]
        ));
    }

    #[test]
    fn test_foreground_midline_structures() {
        let mut data = four_ribs([3, 3, 3, 3]);
        data.slice_mut(s![3..10, 0..2, 18..22]).fill(3);
        let v = volume(data);
        let cfg = RelabelConfig::new(5)
            .with_mode(ExtractMode::Foreground)
            .with_midline_structures(vec![STERNUM]);
        let r = Relabeler::new(&cfg).relabel(&v).unwrap();
        assert_eq!(r.volume()[(5, 1, 20)], STERNUM);
        assert_eq!(r.volume()[(9, 2, 30)], 1);
        assert_eq!(r.assigned().len(), 5);
    }

    #[test]
    fn test_invalid_geometry_is_fatal() {
        let v = LabelVolume::new(four_ribs([1, 2, 3, 4]), Affine::from_spacing([1.0, 1.0, 0.0], [0.0; 3]));
        let cfg = RelabelConfig::new(4);
        assert!(matches!(
            Relabeler::new(&cfg).relabel(&v),
            Err(crate::Error::InvalidGeometry(_))
        ));
    }
}
