//! 三维向量小工具.
//!
//! 对外的点与向量都是 `[f64; 3]`; 运算交给 `nalgebra`, 这里只做转换.

use nalgebra::{Point3 as NaPoint3, Vector3};

use crate::{Point3, Vec3};

#[inline]
fn v(a: &Vec3) -> Vector3<f64> {
    Vector3::from(*a)
}

/// 点积.
#[inline]
pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    v(a).dot(&v(b))
}

/// 欧几里得范数.
#[inline]
pub fn norm(a: &Vec3) -> f64 {
    v(a).norm()
}

/// 单位化. 零向量或含非有限分量时返回 `None`.
#[inline]
pub fn normalize(a: &Vec3) -> Option<Vec3> {
    let a = v(a);
    let n = a.norm();
    (n.is_finite() && n > 0.0).then(|| (a / n).into())
}

/// 取反.
#[inline]
pub fn neg(a: &Vec3) -> Vec3 {
    (-v(a)).into()
}

/// `p + k * d`.
#[inline]
pub fn scale_add(p: &Point3, d: &Vec3, k: f64) -> Point3 {
    (NaPoint3::from(*p) + v(d) * k).coords.into()
}

/// 两点间的欧几里得距离.
#[inline]
pub fn distance(a: &Point3, b: &Point3) -> f64 {
    nalgebra::distance(&NaPoint3::from(*a), &NaPoint3::from(*b))
}

/// 角度转换为弧度.
#[inline]
pub fn deg_to_rad(angle: f64) -> f64 {
    angle * std::f64::consts::PI / 180.0
}

/// 弧度转换为角度.
#[inline]
pub fn rad_to_deg(arc: f64) -> f64 {
    arc * 180.0 * std::f64::consts::FRAC_1_PI
}

/// 两个方向之间的轴向夹角 (单位: 度), 即把 `v` 与 `-v` 视为同一方向.
/// 两者都必须是单位向量.
#[inline]
pub fn axial_angle(a: &Vec3, b: &Vec3) -> f64 {
    rad_to_deg(dot(a, b).abs().min(1.0).acos())
}

/// 若 `v` 与 `reference` 方向相反, 则将其翻转.
#[inline]
pub fn orient_like(v: &Vec3, reference: &Vec3) -> Vec3 {
    if dot(v, reference) < 0.0 {
        neg(v)
    } else {
        *v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), None);
        assert_eq!(normalize(&[f64::NAN, 0.0, 1.0]), None);
        let v = normalize(&[3.0, 0.0, 4.0]).unwrap();
        assert!(f64_eq(v[0], 0.6) && f64_eq(v[2], 0.8));
    }

    #[test]
    fn test_axial_angle() {
        let x = [1.0, 0.0, 0.0];
        assert!(f64_eq(axial_angle(&x, &[-1.0, 0.0, 0.0]), 0.0));
        assert!(f64_eq(axial_angle(&x, &[0.0, 1.0, 0.0]), 90.0));
        let d = normalize(&[1.0, 1.0, 0.0]).unwrap();
        assert!(f64_eq(axial_angle(&x, &d), 45.0));
        assert!(f64_eq(axial_angle(&neg(&x), &d), 45.0));
    }

    #[test]
    fn test_orient_like() {
        let r = [0.0, 0.0, 1.0];
        assert_eq!(orient_like(&[0.0, 0.6, -0.8], &r), [0.0, -0.6, 0.8]);
        assert_eq!(orient_like(&[0.0, 0.6, 0.8], &r), [0.0, 0.6, 0.8]);
    }
}
