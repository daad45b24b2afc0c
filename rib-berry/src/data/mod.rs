use std::collections::BTreeMap;
use std::io;
use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::consts::canonical::is_background;
use crate::Idx3d;

mod affine;

pub use affine::{Affine, Frame};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 判断两个体数据是否共享网格时, 仿射矩阵逐元素的容差 (毫米).
const GRID_TOLERANCE: f64 = 1e-4;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 两个体数据的体素网格不一致.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GridMismatch {
    /// 形状不同. `(z, h, w)` 格式.
    #[error("shape {prediction:?} vs {truth:?}")]
    Shape {
        /// 预测的形状.
        prediction: Idx3d,
        /// 真值的形状.
        truth: Idx3d,
    },

    /// 形状相同但仿射矩阵不同.
    #[error("affine transforms differ")]
    Affine,
}

/// 3D 多标签体数据, 包括标签数组和体素到物理空间的仿射矩阵. 标签值以 `u8` 保存, `0` 为背景.
///
/// 体数据一旦交给下游组件就不再被修改; 所有处理步骤都会生成新的实例.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    /// 从 nii 文件读入时保留的原始 header, 写回时沿用.
    header: Option<BoxedHeader>,
    affine: Affine,
    data: Array3<u8>,
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 由 `(z, h, w)` 排列的标签数组和仿射矩阵直接创建.
    pub fn new(data: Array3<u8>, affine: Affine) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        Self {
            header: None,
            affine,
            data,
        }
    }

    /// 由按照 nifti 惯用标准以 \[w, h, z\] 格式存储的标签数组创建.
    #[inline]
    pub fn from_nifti_order(data: Array3<u8>, affine: Affine) -> Self {
        Self::new(data.permuted_axes([2, 1, 0]), affine)
    }

    /// 打开 nii 文件格式的 3D 标签. `path` 为 nii 文件的本地路径. 如果打开成功,
    /// 则返回 `Ok(Self)`, 否则返回 `Err`.
    ///
    /// 仿射矩阵按 [`Affine::from_header`] 的规则从 header 中恢复.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W]
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj.into_volume().into_ndarray::<u8>()?;
        if data.ndim() != 3 {
            let msg = format!("expected a 3D volume, found {} dimensions", data.ndim());
            return Err(io::Error::new(io::ErrorKind::InvalidData, msg).into());
        }
        let data = data.permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        let shape = get_shape_from_header(&header);
        let data = Array3::<u8>::from_shape_vec(shape, data.into_raw_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            affine: Affine::from_header(&header),
            header: Some(header),
            data,
        })
    }

    /// 以 nii 格式保存到 `path`. 若该体数据来自文件, 则沿用原 header;
    /// 否则生成一个新的 header, 并把仿射矩阵写入其 `sform` 字段.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        let mut header = self
            .header
            .as_deref()
            .cloned()
            .unwrap_or_else(NiftiHeader::default);
        if self.header.is_none() {
            self.affine.write_sform(&mut header);
        }

        // (z, h, w) -> (w, h, z). 写入器内部会再转置为 Fortran 顺序.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)
    }

    /// 在相同网格 (形状, 仿射矩阵, header) 上创建一个新的体数据.
    ///
    /// `data` 的形状必须与 `self` 一致, 否则程序 panic.
    pub fn with_data(&self, data: Array3<u8>) -> Self {
        assert_eq!(data.dim(), self.shape(), "新数据与原网格形状不一致");
        Self {
            header: self.header.clone(),
            affine: self.affine,
            data,
        }
    }

    /// 在相同网格上创建全背景体数据.
    #[inline]
    pub fn zeros_like(&self) -> Self {
        self.with_data(Array3::zeros(self.data.dim()))
    }

    /// 获取数据形状大小 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取仿射矩阵.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 获取原始 nii header (若有).
    #[inline]
    pub fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 消费自我, 获得底层数组.
    #[inline]
    pub fn into_data(self) -> Array3<u8> {
        self.data
    }

    /// 获取体数据中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 所有前景标签值及其体素个数, 按标签值升序.
    pub fn label_counts(&self) -> BTreeMap<u8, usize> {
        let mut ans = BTreeMap::new();
        for &p in self.data.iter().filter(|p| !is_background(**p)) {
            *ans.entry(p).or_insert(0) += 1;
        }
        ans
    }

    /// 是否全为背景?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 检查两个体数据是否位于同一体素网格上 (形状相同, 仿射矩阵在容差内一致).
    pub fn same_grid(&self, other: &Self) -> Result<(), GridMismatch> {
        if self.shape() != other.shape() {
            return Err(GridMismatch::Shape {
                prediction: self.shape(),
                truth: other.shape(),
            });
        }
        if !self.affine.approx_eq(&other.affine, GRID_TOLERANCE) {
            return Err(GridMismatch::Affine);
        }
        Ok(())
    }

    /// 体数据在物理 x 轴上的范围 `(min, max)`, 由八个角点体素中心计算.
    pub fn physical_x_extent(&self) -> (f64, f64) {
        let (z, h, w) = self.shape();
        let last = |n: usize| n.saturating_sub(1);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for zz in [0, last(z)] {
            for hh in [0, last(h)] {
                for ww in [0, last(w)] {
                    let [x, _, _] = self.affine.voxel_to_physical((zz, hh, ww));
                    lo = lo.min(x);
                    hi = hi.max(x);
                }
            }
        }
        (lo, hi)
    }

    /// `pos` 沿 `(dz, dh, dw)` 偏移后的坐标. 越界时返回 `None`.
    #[inline]
    pub(crate) fn offset(
        (z, h, w): Idx3d,
        (dz, dh, dw): (isize, isize, isize),
        shape: Idx3d,
    ) -> Option<Idx3d> {
        let nz = z.checked_add_signed(dz)?;
        let nh = h.checked_add_signed(dh)?;
        let nw = w.checked_add_signed(dw)?;
        (nz < shape.0 && nh < shape.1 && nw < shape.2).then_some((nz, nh, nw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn test_same_grid() {
        let a = LabelVolume::new(Array3::zeros((2, 3, 4)), Affine::identity());
        let b = LabelVolume::new(Array3::zeros((2, 3, 5)), Affine::identity());
        assert!(matches!(a.same_grid(&b), Err(GridMismatch::Shape { .. })));

        let c = LabelVolume::new(
            Array3::zeros((2, 3, 4)),
            Affine::from_spacing([1.0, 1.0, 2.0], [0.0; 3]),
        );
        assert_eq!(a.same_grid(&c), Err(GridMismatch::Affine));
        assert!(a.same_grid(&a.zeros_like()).is_ok());
    }

    #[test]
    fn test_counts_and_nifti_order() {
        let mut data = Array3::<u8>::zeros((4, 3, 2)); // [w, h, z]
        data.slice_mut(s![.., .., 1]).fill(7);
        data[(0, 0, 0)] = 3;
        let v = LabelVolume::from_nifti_order(data, Affine::identity());

        assert_eq!(v.shape(), (2, 3, 4));
        assert_eq!(v[(0, 0, 0)], 3);
        assert_eq!(v.count(7), 12);
        assert_eq!(v.label_counts().into_iter().collect::<Vec<_>>(), vec![(3, 1), (7, 12)]);
        assert!(!v.is_background());
        assert!(v.zeros_like().is_background());
    }

    #[test]
    fn test_physical_x_extent_flipped() {
        // x 轴反向 (LPS 风格存储).
        let v = LabelVolume::new(
            Array3::zeros((2, 2, 11)),
            Affine::from_spacing([-2.0, 1.0, 1.0], [10.0, 0.0, 0.0]),
        );
        assert_eq!(v.physical_x_extent(), (-10.0, 10.0));
    }

    #[test]
    fn test_offset_bounds() {
        let shape = (2, 2, 2);
        assert_eq!(LabelVolume::offset((0, 0, 0), (-1, 0, 0), shape), None);
        assert_eq!(LabelVolume::offset((0, 0, 1), (0, 1, 0), shape), Some((0, 1, 1)));
        assert_eq!(LabelVolume::offset((1, 1, 1), (1, 0, 0), shape), None);
    }
}
