//! 方向场: 给定位置与来向, 给出下一步的前进方向.
//!
//! 两种实现:
//!
//! 1. [`PeakDirectionField`]: 基于每体素峰值方向的确定性方向场;
//! 2. [`PmfDirectionField`]: 基于离散球面 PMF 的方向场, 支持概率采样与确定性最大值两种模式.
//!
//! 方向是轴对称的: `v` 与 `-v` 表示同一纤维方向, 返回值总是翻转到与来向同侧.

use either::Either;
use rand::Rng;

use crate::data::Affine;
use crate::{Idx3d, Point3, Vec3};

mod peak;
mod pmf;

pub use peak::PeakDirectionField;
pub use pmf::{PmfDirectionField, PmfMode, PmfVolume};

/// 一个候选方向.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Direction {
    /// 单位方向向量.
    pub vector: Vec3,

    /// 置信度 (峰值或 PMF 值).
    pub confidence: f64,
}

/// 方向场.
///
/// 方向场在构造完成后是只读的, 可以在多个线程之间共享.
pub trait DirectionField: Sync {
    /// 方向场所在体素网格的形状与仿射矩阵.
    fn grid(&self) -> (Idx3d, &Affine);

    /// 种子点处的候选初始方向, 最好的排在最前. 没有可用方向时返回空 `Vec`.
    fn initial_directions(&self, point: &Point3) -> Vec<Direction>;

    /// 在 `point` 处, 给定来向 `previous`, 求下一步方向.
    ///
    /// # 返回值
    ///
    /// - 没有满足角度与阈值约束的候选方向时, 返回 `None`, 追踪在此终止;
    /// - 否则返回单位方向, 且满足 `dot(vector, previous) >= 0`.
    ///
    /// 确定性方向场不会使用 `rng`.
    fn get_direction<R: Rng + ?Sized>(
        &self,
        point: &Point3,
        previous: &Vec3,
        rng: &mut R,
    ) -> Option<Direction>;
}

impl<T: DirectionField> DirectionField for &T {
    #[inline]
    fn grid(&self) -> (Idx3d, &Affine) {
        (**self).grid()
    }

    #[inline]
    fn initial_directions(&self, point: &Point3) -> Vec<Direction> {
        (**self).initial_directions(point)
    }

    #[inline]
    fn get_direction<R: Rng + ?Sized>(
        &self,
        point: &Point3,
        previous: &Vec3,
        rng: &mut R,
    ) -> Option<Direction> {
        (**self).get_direction(point, previous, rng)
    }
}

impl<L: DirectionField, Rt: DirectionField> DirectionField for Either<L, Rt> {
    #[inline]
    fn grid(&self) -> (Idx3d, &Affine) {
        match self {
            Either::Left(l) => l.grid(),
            Either::Right(r) => r.grid(),
        }
    }

    #[inline]
    fn initial_directions(&self, point: &Point3) -> Vec<Direction> {
        match self {
            Either::Left(l) => l.initial_directions(point),
            Either::Right(r) => r.initial_directions(point),
        }
    }

    #[inline]
    fn get_direction<R: Rng + ?Sized>(
        &self,
        point: &Point3,
        previous: &Vec3,
        rng: &mut R,
    ) -> Option<Direction> {
        match self {
            Either::Left(l) => l.get_direction(point, previous, rng),
            Either::Right(r) => r.get_direction(point, previous, rng),
        }
    }
}

/// 校验最大转角 (单位: 度), 必须位于 `(0, 90]`.
pub(crate) fn check_angle(angle: f64) -> Result<f64, crate::ConfigError> {
    if angle.is_finite() && angle > 0.0 && angle <= 90.0 {
        Ok(angle)
    } else {
        Err(crate::ConfigError::AngleOutOfRange(angle))
    }
}

/// 校验比例阈值, 必须位于 `[0, 1]`.
pub(crate) fn check_ratio(ratio: f64) -> Result<f64, crate::ConfigError> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(crate::ConfigError::InvalidThreshold(ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::{check_angle, check_ratio, DirectionField, PeakDirectionField};
    use crate::data::Affine;
    use crate::peaks::PeaksVolume;
    use either::Either;
    use ndarray::{Array4, Array5};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn constant_x() -> PeakDirectionField {
        let mut dirs = Array5::<f64>::zeros((3, 3, 3, 1, 3));
        dirs.slice_mut(ndarray::s![.., .., .., 0, 0]).fill(1.0);
        let vals = Array4::<f64>::ones((3, 3, 3, 1));
        let peaks = PeaksVolume::new(dirs, vals, Affine::identity()).unwrap();
        PeakDirectionField::new(peaks, 60.0, 0.5, 25.0).unwrap()
    }

    #[test]
    fn test_either_dispatch() {
        let field = constant_x();
        let mut rng = StdRng::seed_from_u64(0);
        let left: Either<&PeakDirectionField, PeakDirectionField> = Either::Left(&field);
        let d = left.get_direction(&[1.0, 1.0, 1.0], &[-1.0, 0.0, 0.0], &mut rng).unwrap();
        assert_eq!(d.vector, [-1.0, 0.0, 0.0]);
        assert_eq!(left.grid().0, (3, 3, 3));
        assert_eq!(left.initial_directions(&[0.0, 0.0, 0.0]).len(), 1);
    }

    #[test]
    fn test_param_check() {
        assert!(check_angle(0.0).is_err());
        assert!(check_angle(91.0).is_err());
        assert!(check_angle(f64::NAN).is_err());
        assert_eq!(check_angle(90.0), Ok(90.0));
        assert!(check_ratio(-0.1).is_err());
        assert!(check_ratio(1.5).is_err());
        assert_eq!(check_ratio(0.0), Ok(0.0));
    }
}
