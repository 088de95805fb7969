//! 体素坐标到物理坐标的仿射变换.

use nalgebra::{Matrix3, Matrix4, Point3 as NaPoint3, Quaternion, RowVector4, UnitQuaternion, Vector3};
use nifti::NiftiHeader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::{AFFINE_EPSILON, SINGULAR_EPSILON};
use crate::{ConfigError, Point3, Vec3};

/// 4x4 齐次仿射矩阵 (体素 -> 物理坐标), 同时缓存其逆矩阵.
///
/// 该结构是只读的, 构造时保证可逆.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Affine {
    m: Matrix4<f64>,
    inv: Matrix4<f64>,
}

impl Affine {
    /// 从按行给出的齐次矩阵构建. 见 [`Affine::from_matrix`].
    #[inline]
    pub fn new(rows: [[f64; 4]; 4]) -> Result<Self, ConfigError> {
        Self::from_matrix(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    /// 从齐次矩阵 `m` 构建.
    ///
    /// # 返回值
    ///
    /// - 含有非有限值时, 返回 `Err(ConfigError::NonFiniteAffine)`;
    /// - 最后一行不是 `[0, 0, 0, 1]` 时, 返回 `Err(ConfigError::NotHomogeneous)`;
    /// - 线性部分不可逆时, 返回 `Err(ConfigError::SingularAffine)`.
    pub fn from_matrix(m: Matrix4<f64>) -> Result<Self, ConfigError> {
        if m.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NonFiniteAffine);
        }
        if m.row(3) != RowVector4::new(0.0, 0.0, 0.0, 1.0) {
            return Err(ConfigError::NotHomogeneous);
        }
        let det = m.fixed_view::<3, 3>(0, 0).determinant();
        if det.abs() < SINGULAR_EPSILON {
            return Err(ConfigError::SingularAffine(det));
        }
        let inv = m.try_inverse().ok_or(ConfigError::SingularAffine(det))?;
        Ok(Self { m, inv })
    }

    /// 单位变换. 体素坐标即物理坐标.
    pub fn identity() -> Self {
        Self {
            m: Matrix4::identity(),
            inv: Matrix4::identity(),
        }
    }

    /// 按三个方向的体素尺寸 (单位: 毫米) 构建对角仿射矩阵.
    pub fn from_zooms(zooms: [f64; 3]) -> Result<Self, ConfigError> {
        Self::from_matrix(Matrix4::new_nonuniform_scaling(&Vector3::from(zooms)))
    }

    /// 从 nifti header 中读取仿射矩阵.
    ///
    /// 优先使用 sform (`sform_code > 0`), 其次 qform (`qform_code > 0`),
    /// 都不存在时退化为由 `pixdim` 构成的对角矩阵.
    pub fn from_nifti_header(h: &NiftiHeader) -> Result<Self, ConfigError> {
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(|v| v as f64);
            return Self::new([
                row(&h.srow_x),
                row(&h.srow_y),
                row(&h.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ]);
        }

        let [qfac, dx, dy, dz, ..] = h.pixdim.map(|v| v as f64);
        let zoom = |v: f64| if v == 0.0 { 1.0 } else { v.abs() };
        let (dx, dy, dz) = (zoom(dx), zoom(dy), zoom(dz));
        if h.qform_code <= 0 {
            return Self::from_zooms([dx, dy, dz]);
        }

        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        // 数值误差可能使 `1 - b^2 - c^2 - d^2` 略小于 0.
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = UnitQuaternion::from_quaternion(Quaternion::new(a, b, c, d)).to_rotation_matrix();
        let dz = if qfac < 0.0 { -dz } else { dz };
        let linear = rot.matrix() * Matrix3::from_diagonal(&Vector3::new(dx, dy, dz));

        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&Vector3::new(
            h.quatern_x as f64,
            h.quatern_y as f64,
            h.quatern_z as f64,
        ));
        Self::from_matrix(m)
    }

    /// 获取底层齐次矩阵.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.m
    }

    /// 获取逆矩阵.
    #[inline]
    pub fn inverse_matrix(&self) -> &Matrix4<f64> {
        &self.inv
    }

    /// 体素坐标 (可以是小数) -> 物理坐标.
    #[inline]
    pub fn apply(&self, voxel: [f64; 3]) -> Point3 {
        self.m.transform_point(&NaPoint3::from(voxel)).coords.into()
    }

    /// 物理坐标 -> 体素坐标 (小数).
    #[inline]
    pub fn apply_inverse(&self, world: &Point3) -> [f64; 3] {
        self.inv.transform_point(&NaPoint3::from(*world)).coords.into()
    }

    /// 只对向量施加线性部分.
    #[inline]
    pub fn apply_vector(&self, v: &Vec3) -> Vec3 {
        self.m.transform_vector(&Vector3::from(*v)).into()
    }

    /// 只对向量施加逆变换的线性部分.
    #[inline]
    pub fn apply_inverse_vector(&self, v: &Vec3) -> Vec3 {
        self.inv.transform_vector(&Vector3::from(*v)).into()
    }

    /// 三个体素轴方向的体素尺寸 (线性部分的列范数).
    pub fn zooms(&self) -> [f64; 3] {
        let linear = self.m.fixed_view::<3, 3>(0, 0);
        [linear.column(0).norm(), linear.column(1).norm(), linear.column(2).norm()]
    }

    /// 两个仿射矩阵是否在逐元素容差内相同.
    pub fn approx_eq(&self, other: &Affine) -> bool {
        self.m
            .iter()
            .zip(other.m.iter())
            .all(|(a, b)| (a - b).abs() <= AFFINE_EPSILON)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::Affine;
    use crate::ConfigError;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn assert_point_eq(a: [f64; 3], b: [f64; 3]) {
        assert!(a.iter().zip(b.iter()).all(|(x, y)| f64_eq(*x, *y)), "{a:?} != {b:?}");
    }

    #[test]
    fn test_affine_init_err() {
        let singular = [
            [1.0, 2.0, 3.0, 0.0],
            [2.0, 4.0, 6.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert!(matches!(
            Affine::new(singular),
            Err(ConfigError::SingularAffine(_))
        ));

        let mut not_homogeneous = *Affine::identity().matrix();
        not_homogeneous[(3, 0)] = 1.0;
        assert_eq!(
            Affine::from_matrix(not_homogeneous).unwrap_err(),
            ConfigError::NotHomogeneous
        );

        let mut nan = *Affine::identity().matrix();
        nan[(0, 3)] = f64::NAN;
        assert_eq!(Affine::from_matrix(nan).unwrap_err(), ConfigError::NonFiniteAffine);

        assert!(Affine::from_zooms([1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_affine_round_trip() {
        // 斜切 + 缩放 + 平移.
        let a = Affine::new([
            [2.0, 0.5, 0.0, -10.0],
            [0.0, 1.5, 0.2, 4.0],
            [0.1, 0.0, 3.0, 7.5],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        for voxel in [[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [-4.5, 10.25, 0.5]] {
            let world = a.apply(voxel);
            assert_point_eq(a.apply_inverse(&world), voxel);
        }
        let v = [1.0, -2.0, 0.5];
        assert_point_eq(a.apply_inverse_vector(&a.apply_vector(&v)), v);
    }

    #[test]
    fn test_affine_zooms() {
        let a = Affine::from_zooms([2.0, 2.5, 3.0]).unwrap();
        assert_point_eq(a.zooms(), [2.0, 2.5, 3.0]);
        assert_point_eq(a.apply([1.0, 1.0, 1.0]), [2.0, 2.5, 3.0]);
        assert!(a.approx_eq(&Affine::from_zooms([2.0, 2.5, 3.0]).unwrap()));
        assert!(!a.approx_eq(&Affine::identity()));
    }

    #[test]
    fn test_affine_from_header() {
        let mut h = nifti::NiftiHeader::default();
        h.pixdim = [1.0, 2.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        h.sform_code = 0;
        h.qform_code = 0;
        let a = Affine::from_nifti_header(&h).unwrap();
        assert_point_eq(a.zooms(), [2.0, 2.0, 3.0]);

        // 单位四元数的 qform, 带平移.
        h.qform_code = 1;
        (h.quatern_b, h.quatern_c, h.quatern_d) = (0.0, 0.0, 0.0);
        (h.quatern_x, h.quatern_y, h.quatern_z) = (10.0, -5.0, 1.0);
        let a = Affine::from_nifti_header(&h).unwrap();
        assert_point_eq(a.apply([1.0, 1.0, 1.0]), [12.0, -3.0, 4.0]);

        h.sform_code = 1;
        h.srow_x = [1.0, 0.0, 0.0, 1.0];
        h.srow_y = [0.0, 1.0, 0.0, 2.0];
        h.srow_z = [0.0, 0.0, 1.0, 3.0];
        let a = Affine::from_nifti_header(&h).unwrap();
        assert_point_eq(a.apply([0.0, 0.0, 0.0]), [1.0, 2.0, 3.0]);
    }
}
