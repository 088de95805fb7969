//! 停止判据: 在物理坐标处判断追踪是否继续.

use crate::data::Affine;
use crate::{ConfigError, GridAttr, Idx3d, MaskVolume, Point3, ScalarVolume};

/// 停止判据的结果.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrackerStatus {
    /// 继续追踪.
    Continue,

    /// 停止追踪. 当前点仍然计入 streamline.
    Stop,

    /// 当前点无效 (越界或不在有效掩膜内). 当前点不计入 streamline.
    Invalid,
}

/// 停止判据.
pub trait StoppingCriterion: Sync {
    /// 判断物理坐标 `point` 处的状态.
    fn check(&self, point: &Point3) -> TrackerStatus;

    /// 判据所在体素网格的形状与仿射矩阵. 不依赖网格的判据返回 `None`.
    #[inline]
    fn grid(&self) -> Option<(Idx3d, &Affine)> {
        None
    }
}

impl<T: StoppingCriterion> StoppingCriterion for &T {
    #[inline]
    fn check(&self, point: &Point3) -> TrackerStatus {
        (**self).check(point)
    }

    #[inline]
    fn grid(&self) -> Option<(Idx3d, &Affine)> {
        (**self).grid()
    }
}

/// 阈值判据: 标量场 (如 FA) 三线性插值后 `>= threshold` 则继续, 否则停止.
///
/// 网格外, 或者最近邻体素不在有效掩膜 (若有) 内时, 返回 [`TrackerStatus::Invalid`].
#[derive(Debug, Clone)]
pub struct ThresholdStoppingCriterion {
    field: ScalarVolume,
    threshold: f64,
    mask: Option<MaskVolume>,
}

impl ThresholdStoppingCriterion {
    /// 创建阈值判据. `threshold` 必须是有限值.
    pub fn new(field: ScalarVolume, threshold: f64) -> Result<Self, ConfigError> {
        if !threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self {
            field,
            threshold,
            mask: None,
        })
    }

    /// 附加有效掩膜. 掩膜必须与标量场处于同一空间, 否则返回 `Err(ConfigError::GridMismatch)`.
    pub fn with_mask(mut self, mask: MaskVolume) -> Result<Self, ConfigError> {
        if !self.field.same_space(&mask) {
            return Err(ConfigError::GridMismatch);
        }
        self.mask = Some(mask);
        Ok(self)
    }

    /// 阈值.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 底层标量场.
    #[inline]
    pub fn field(&self) -> &ScalarVolume {
        &self.field
    }
}

impl StoppingCriterion for ThresholdStoppingCriterion {
    fn check(&self, point: &Point3) -> TrackerStatus {
        let v = self.field.to_voxel(point);
        if !self.field.contains_voxel(&v) {
            return TrackerStatus::Invalid;
        }
        if let Some(mask) = &self.mask {
            if mask.contains(point) != Some(true) {
                return TrackerStatus::Invalid;
            }
        }
        match crate::data::interp::trilinear(self.field.data(), &v) {
            Some(value) if value >= self.threshold => TrackerStatus::Continue,
            Some(_) => TrackerStatus::Stop,
            None => TrackerStatus::Invalid,
        }
    }

    #[inline]
    fn grid(&self) -> Option<(Idx3d, &Affine)> {
        Some((self.field.shape(), self.field.affine()))
    }
}

/// 二值判据: 掩膜为真的体素内继续, 掩膜为假的体素内停止, 网格外无效.
#[derive(Debug, Clone)]
pub struct BinaryStoppingCriterion {
    mask: MaskVolume,
}

impl BinaryStoppingCriterion {
    /// 由掩膜创建.
    #[inline]
    pub fn new(mask: MaskVolume) -> Self {
        Self { mask }
    }
}

impl StoppingCriterion for BinaryStoppingCriterion {
    #[inline]
    fn check(&self, point: &Point3) -> TrackerStatus {
        match self.mask.contains(point) {
            Some(true) => TrackerStatus::Continue,
            Some(false) => TrackerStatus::Stop,
            None => TrackerStatus::Invalid,
        }
    }

    #[inline]
    fn grid(&self) -> Option<(Idx3d, &Affine)> {
        Some((self.mask.shape(), self.mask.affine()))
    }
}

/// 由闭包构成的判据, 不绑定任何网格. 主要用于合成实验.
#[derive(Clone)]
pub struct FnStoppingCriterion<F> {
    f: F,
}

impl<F> FnStoppingCriterion<F>
where
    F: Fn(&Point3) -> TrackerStatus + Sync,
{
    /// 包装闭包 `f`.
    #[inline]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> StoppingCriterion for FnStoppingCriterion<F>
where
    F: Fn(&Point3) -> TrackerStatus + Sync,
{
    #[inline]
    fn check(&self, point: &Point3) -> TrackerStatus {
        (self.f)(point)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BinaryStoppingCriterion, FnStoppingCriterion, StoppingCriterion,
        ThresholdStoppingCriterion, TrackerStatus,
    };
    use crate::{Affine, ConfigError, MaskVolume, ScalarVolume};
    use ndarray::Array3;

    fn ramp() -> ScalarVolume {
        // fa(i, j, k) = i / 4
        let data = Array3::from_shape_fn((5, 2, 2), |(i, _, _)| i as f32 / 4.0);
        ScalarVolume::new(data, Affine::from_zooms([2.0, 2.0, 2.0]).unwrap()).unwrap()
    }

    #[test]
    fn test_threshold() {
        let c = ThresholdStoppingCriterion::new(ramp(), 0.5).unwrap();
        // 体素坐标 (3, 0, 0) -> 0.75
        assert_eq!(c.check(&[6.0, 0.0, 0.0]), TrackerStatus::Continue);
        // 体素坐标 (2, 0, 0) -> 0.5, 相等时继续.
        assert_eq!(c.check(&[4.0, 0.0, 0.0]), TrackerStatus::Continue);
        // 体素坐标 (1.5, 0, 0) -> 0.375
        assert_eq!(c.check(&[3.0, 0.0, 0.0]), TrackerStatus::Stop);
        // 网格外.
        assert_eq!(c.check(&[-1.2, 0.0, 0.0]), TrackerStatus::Invalid);
        assert_eq!(c.check(&[0.0, 0.0, 3.0]), TrackerStatus::Invalid);
        assert_eq!(c.grid().unwrap().0, (5, 2, 2));

        assert!(ThresholdStoppingCriterion::new(ramp(), f64::NAN).is_err());
    }

    #[test]
    fn test_threshold_with_mask() {
        let fa = ramp();
        let mut mask = MaskVolume::from_threshold(&fa, 0.0);
        mask[(4, 0, 0)] = false;
        let c = ThresholdStoppingCriterion::new(fa.clone(), 0.5)
            .unwrap()
            .with_mask(mask)
            .unwrap();
        assert_eq!(c.check(&[8.0, 0.0, 0.0]), TrackerStatus::Invalid);
        assert_eq!(c.check(&[8.0, 2.0, 0.0]), TrackerStatus::Continue);

        let other = MaskVolume::new(Array3::from_elem((5, 2, 2), true), Affine::identity()).unwrap();
        assert_eq!(
            ThresholdStoppingCriterion::new(fa, 0.5)
                .unwrap()
                .with_mask(other)
                .unwrap_err(),
            ConfigError::GridMismatch
        );
    }

    #[test]
    fn test_binary() {
        let mut data = Array3::from_elem((3, 3, 3), false);
        data[(1, 1, 1)] = true;
        let c = BinaryStoppingCriterion::new(MaskVolume::new(data, Affine::identity()).unwrap());
        assert_eq!(c.check(&[1.2, 0.9, 1.4]), TrackerStatus::Continue);
        assert_eq!(c.check(&[0.0, 0.0, 0.0]), TrackerStatus::Stop);
        assert_eq!(c.check(&[2.5, 0.0, 0.0]), TrackerStatus::Invalid);
    }

    #[test]
    fn test_fn_and_ref() {
        let c = FnStoppingCriterion::new(|p: &[f64; 3]| {
            if p[0] < 10.0 {
                TrackerStatus::Continue
            } else {
                TrackerStatus::Stop
            }
        });
        let r = &c;
        assert_eq!(r.check(&[9.9, 0.0, 0.0]), TrackerStatus::Continue);
        assert_eq!(r.check(&[10.0, 0.0, 0.0]), TrackerStatus::Stop);
        assert!(r.grid().is_none());
    }
}
