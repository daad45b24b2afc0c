#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对胸部 CT 肋骨多标签分割结果进行去噪、解剖学重标注和评估.
//!
//! 上游分割模型给出的多标签 3D 体数据经常出现以下问题: 同一根肋骨碎成若干不连通的片段,
//! 左右两侧标签互换, 上下顺序错乱, 以及夹杂大量小噪声块. 本 crate 负责:
//!
//! 1. 基于三维连通分量分析清理噪声;
//! 2. 为保留下来的分量重新分配符合解剖学顺序的标准 (canonical) 标签;
//! 3. 将修正后的结果与真值逐结构比较, 并在病例和队列两个层面汇总 Dice.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 坐标约定
//!
//! 体数据统一按照 `(z, h, w)` 访问 (切片, 行, 列), 即 NIfTI 体素索引 `(k, j, i)` 的倒序.
//! 仿射矩阵总是作用在 NIfTI 顺序 `(i, j, k) = (w, h, z)` 上. 物理坐标系默认为 RAS
//! (NIfTI 读取器的惯例), 也可以切换为 LPS (DICOM 的惯例), 两者的物理 z 轴都指向头侧.
//!
//! # 标准标签
//!
//! - `1..=12`: 右侧肋骨, 自上而下;
//! - `13..=24`: 左侧肋骨, 自上而下;
//! - `25`: 胸骨;
//! - `26`: 肋软骨;
//! - `0`: 背景.
//!
//! # 开发计划
//!
//! ### 三维连通分量提取 ✅
//!
//! 支持 6/18/26-邻接, 默认 18-邻接. 实现位于 `rib-berry/src/components`.
//!
//! ### 按侧别与上下顺序重标注 ✅
//!
//! 实现位于 `rib-berry/src/relabel`.
//!
//! ### 标签匹配与 Dice / Hausdorff 评估 ✅
//!
//! 支持同 ID 匹配, 以及按预测分量进行的最大重叠匹配与最近质心匹配.
//! 实现位于 `rib-berry/src/eval`.
//!
//! ### 与基线分割的整体 Hausdorff 对比 ✅
//!
//! 给出相对基线的改进百分比和分级. 实现位于 `rib-berry/src/eval/baseline.rs`.
//!
//! ### 批处理与队列统计 ✅
//!
//! 借助 `rayon` 并行处理病例, 单个病例失败或超时不会影响其它病例.
//! 实现位于 `rib-berry/src/pipeline`.
//!
//! ### 第一肋骨结节修复 ⌛️
//!
//! 需要 CT HU 值参与区域生长, 暂不在本 crate 范围内.

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 物理空间坐标 `[x, y, z]`, 以毫米为单位.
pub type Point3 = [f64; 3];

/// 体数据与其空间几何信息.
mod data;

pub use data::{Affine, Frame, GridMismatch, LabelVolume};

mod budget;

pub use budget::{Budget, CancelToken};

mod error;

pub use error::{Error, GeometryDefect, Result};

pub mod components;
pub mod consts;
pub mod eval;
pub mod pipeline;
pub mod prelude;
pub mod relabel;
pub mod report;
pub mod taxonomy;
