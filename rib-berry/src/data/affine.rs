//! 体素索引到物理坐标的仿射变换.

use crate::{GeometryDefect, Idx3d, Point3};
use nifti::NiftiHeader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 行列式绝对值低于该值时视为奇异.
const SINGULAR_TOLERANCE: f64 = 1e-9;

/// 方向列向量夹角余弦的容差. NIfTI 以 `f32` 存储矩阵, 因此不能要求严格正交.
const ORTHOGONAL_TOLERANCE: f64 = 1e-3;

/// 物理坐标系约定.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Frame {
    /// x 轴指向患者右侧 (NIfTI / nibabel 惯例).
    #[default]
    Ras,

    /// x 轴指向患者左侧 (DICOM / ITK 惯例).
    Lps,
}

/// 4x4 仿射矩阵, 将 NIfTI 体素索引 `(i, j, k) = (w, h, z)` 映射到物理坐标 (毫米).
///
/// 该结构是只读的. 若要修改, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Affine {
    rows: [[f64; 4]; 4],
}

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// 单位变换: 物理坐标就是体素索引.
    #[inline]
    pub const fn identity() -> Self {
        Self {
            rows: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// 直接由行优先的 4x4 矩阵创建. 不做任何检查, 请在使用前调用 [`Self::validate`].
    #[inline]
    pub const fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self { rows }
    }

    /// 轴对齐的仿射变换. `spacing` 和 `origin` 均按 `(i, j, k) = (w, h, z)` 排列.
    pub fn from_spacing(spacing: [f64; 3], origin: [f64; 3]) -> Self {
        let [si, sj, sk] = spacing;
        let [ox, oy, oz] = origin;
        Self {
            rows: [
                [si, 0.0, 0.0, ox],
                [0.0, sj, 0.0, oy],
                [0.0, 0.0, sk, oz],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// 从 NIfTI header 中恢复仿射矩阵.
    ///
    /// 按照 NIfTI 标准, 依次尝试 `sform`, `qform`, 最后退化为仅由 `pixdim` 构成的对角矩阵.
    pub fn from_header(header: &NiftiHeader) -> Self {
        if header.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(f64::from);
            return Self {
                rows: [
                    row(&header.srow_x),
                    row(&header.srow_y),
                    row(&header.srow_z),
                    [0.0, 0.0, 0.0, 1.0],
                ],
            };
        }

        let [_, pi, pj, pk, ..] = header.pixdim.map(f64::from);
        if header.qform_code <= 0 {
            return Self::from_spacing([pi, pj, pk], [0.0; 3]);
        }

        let (b, c, d) = (
            f64::from(header.quatern_b),
            f64::from(header.quatern_c),
            f64::from(header.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let r = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - b * b - c * c,
            ],
        ];
        let scale = [pi, pj, pk * qfac];
        let offset = [
            f64::from(header.quatern_x),
            f64::from(header.quatern_y),
            f64::from(header.quatern_z),
        ];

        let mut rows = Self::identity().rows;
        for (row, (r, o)) in rows.iter_mut().zip(r.iter().zip(offset)) {
            for col in 0..3 {
                row[col] = r[col] * scale[col];
            }
            row[3] = o;
        }
        Self { rows }
    }

    /// 将仿射矩阵写回 header 的 `sform` 字段.
    pub(crate) fn write_sform(&self, header: &mut NiftiHeader) {
        let row = |r: &[f64; 4]| r.map(|v| v as f32);
        header.srow_x = row(&self.rows[0]);
        header.srow_y = row(&self.rows[1]);
        header.srow_z = row(&self.rows[2]);
        header.sform_code = header.sform_code.max(1);
        let spacing = self.spacing();
        header.pixdim[1..4].copy_from_slice(&spacing.map(|s| s as f32));
    }

    /// 获取行优先的矩阵.
    #[inline]
    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.rows
    }

    /// 对 NIfTI 顺序的 (可能为小数的) 体素坐标 `(i, j, k)` 做变换.
    #[inline]
    pub fn apply(&self, ijk: [f64; 3]) -> Point3 {
        let m = &self.rows;
        let [i, j, k] = ijk;
        [
            m[0][0] * i + m[0][1] * j + m[0][2] * k + m[0][3],
            m[1][0] * i + m[1][1] * j + m[1][2] * k + m[1][3],
            m[2][0] * i + m[2][1] * j + m[2][2] * k + m[2][3],
        ]
    }

    /// 将 `(z, h, w)` 体素索引变换为物理坐标.
    #[inline]
    pub fn voxel_to_physical(&self, (z, h, w): Idx3d) -> Point3 {
        self.apply([w as f64, h as f64, z as f64])
    }

    /// 将 `(z, h, w)` 顺序的小数体素坐标 (例如质心) 变换为物理坐标.
    #[inline]
    pub fn index_to_physical(&self, [z, h, w]: [f64; 3]) -> Point3 {
        self.apply([w, h, z])
    }

    /// 第 `col` 个方向列向量 (`0 => i`, `1 => j`, `2 => k`).
    #[inline]
    fn column(&self, col: usize) -> [f64; 3] {
        [self.rows[0][col], self.rows[1][col], self.rows[2][col]]
    }

    /// 线性部分的行列式.
    pub fn determinant(&self) -> f64 {
        let m = &self.rows;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// 沿 `(i, j, k)` 三个方向的体素间距 (毫米).
    pub fn spacing(&self) -> [f64; 3] {
        [0, 1, 2].map(|c| norm(&self.column(c)))
    }

    /// 单个体素的体积 (立方毫米).
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.determinant().abs()
    }

    /// 检查几何是否可用: 元素有限, 最后一行为 `[0, 0, 0, 1]`, 线性部分可逆,
    /// 且三个方向列向量两两正交 (允许各向异性的体素间距).
    pub fn validate(&self) -> Result<(), GeometryDefect> {
        if self.rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(GeometryDefect::NonFinite);
        }
        if self.rows[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(GeometryDefect::NotAffine);
        }
        let det = self.determinant();
        if det.abs() < SINGULAR_TOLERANCE {
            return Err(GeometryDefect::Singular(det));
        }
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let (ca, cb) = (self.column(a), self.column(b));
            let cos = dot(&ca, &cb) / (norm(&ca) * norm(&cb));
            if cos.abs() > ORTHOGONAL_TOLERANCE {
                return Err(GeometryDefect::NotOrthogonal(a, b, cos));
            }
        }
        Ok(())
    }

    /// 两个仿射矩阵是否在 `tolerance` 范围内逐元素相等.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

#[inline]
fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
