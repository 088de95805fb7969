use rand::Rng;

use super::{check_angle, check_ratio, Direction, DirectionField};
use crate::data::Affine;
use crate::geom::{deg_to_rad, dot, normalize, orient_like};
use crate::peaks::PeaksVolume;
use crate::{ConfigError, GridAttr, Idx3d, Point3, Vec3};

/// 基于峰值的确定性方向场 ("closest peak").
///
/// 在最近邻体素的峰中, 选择与来向轴向夹角最小的峰. 只考虑峰值不小于
/// `relative_peak_threshold * 该体素最大峰值` 的峰; 与更强的峰轴向夹角小于
/// `min_separation_angle` 的峰视为重复, 不参与选择. 夹角大于 `max_angle` 时无可用方向.
#[derive(Debug, Clone)]
pub struct PeakDirectionField {
    peaks: PeaksVolume,
    max_angle: f64,
    cos_max_angle: f64,
    relative_peak_threshold: f64,
    cos_min_separation: f64,
}

impl PeakDirectionField {
    /// 创建方向场. `max_angle` 与 `min_separation_angle` 单位为度, 须位于 `(0, 90]`;
    /// `relative_peak_threshold` 须位于 `[0, 1]`.
    pub fn new(
        peaks: PeaksVolume,
        max_angle: f64,
        relative_peak_threshold: f64,
        min_separation_angle: f64,
    ) -> Result<Self, ConfigError> {
        let max_angle = check_angle(max_angle)?;
        let relative_peak_threshold = check_ratio(relative_peak_threshold)?;
        let min_separation_angle = check_angle(min_separation_angle)?;
        Ok(Self {
            peaks,
            max_angle,
            cos_max_angle: deg_to_rad(max_angle).cos(),
            relative_peak_threshold,
            cos_min_separation: deg_to_rad(min_separation_angle).cos(),
        })
    }

    /// 最大转角, 单位为度.
    #[inline]
    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }

    /// 底层峰值场.
    #[inline]
    pub fn peaks(&self) -> &PeaksVolume {
        &self.peaks
    }

    /// 体素 `index` 中通过相对阈值且去重后的峰, 按峰值降序. 值相同时槽位靠前者保留.
    fn candidates(&self, index: Idx3d) -> Vec<(Vec3, f64)> {
        let threshold = self.relative_peak_threshold * self.peaks.max_value_at(index);
        let mut kept: Vec<(Vec3, f64)> = Vec::with_capacity(self.peaks.npeaks());
        for (d, v) in self.peaks.peaks_at(index).filter(|(_, v)| *v >= threshold) {
            if kept
                .iter()
                .all(|(k, _)| dot(k, &d).abs() <= self.cos_min_separation)
            {
                kept.push((d, v));
            }
        }
        kept
    }
}

impl DirectionField for PeakDirectionField {
    #[inline]
    fn grid(&self) -> (Idx3d, &Affine) {
        (self.peaks.shape(), self.peaks.affine())
    }

    fn initial_directions(&self, point: &Point3) -> Vec<Direction> {
        let Some(index) = self.peaks.nearest_voxel(point) else {
            return vec![];
        };
        self.candidates(index)
            .into_iter()
            .map(|(vector, confidence)| Direction { vector, confidence })
            .collect()
    }

    fn get_direction<R: Rng + ?Sized>(
        &self,
        point: &Point3,
        previous: &Vec3,
        _rng: &mut R,
    ) -> Option<Direction> {
        let previous = normalize(previous)?;
        let index = self.peaks.nearest_voxel(point)?;

        // 并列时保留槽位靠前者.
        let mut best: Option<(Vec3, f64, f64)> = None;
        for (d, v) in self.candidates(index) {
            let c = dot(&d, &previous).abs();
            if best.map_or(true, |(_, _, bc)| c > bc) {
                best = Some((d, v, c));
            }
        }
        let (d, confidence, c) = best?;
        (c >= self.cos_max_angle).then(|| Direction {
            vector: orient_like(&d, &previous),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::PeakDirectionField;
    use crate::data::Affine;
    use crate::direction::DirectionField;
    use crate::geom::{deg_to_rad, normalize};
    use crate::peaks::PeaksVolume;
    use ndarray::{Array4, Array5};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 单体素, 两个交叉峰: x 方向 (1.0) 与 y 方向 (0.8).
    fn crossing(rel: f64) -> PeakDirectionField {
        let mut dirs = Array5::<f64>::zeros((1, 1, 1, 2, 3));
        let mut vals = Array4::<f64>::zeros((1, 1, 1, 2));
        dirs[[0, 0, 0, 0, 0]] = 1.0;
        vals[[0, 0, 0, 0]] = 1.0;
        dirs[[0, 0, 0, 1, 1]] = 1.0;
        vals[[0, 0, 0, 1]] = 0.8;
        let peaks = PeaksVolume::new(dirs, vals, Affine::identity()).unwrap();
        PeakDirectionField::new(peaks, 45.0, rel, 25.0).unwrap()
    }

    #[test]
    fn test_closest_peak() {
        let field = crossing(0.5);
        let mut rng = StdRng::seed_from_u64(1);
        let o = [0.0, 0.0, 0.0];

        // 来向接近 -y: 选择 y 峰, 并翻转为 -y.
        let prev = normalize(&[0.2, -1.0, 0.0]).unwrap();
        let d = field.get_direction(&o, &prev, &mut rng).unwrap();
        assert_eq!(d.vector, [-0.0, -1.0, -0.0]);
        assert_eq!(d.confidence, 0.8);

        // 来向与两个峰都超过 45 度.
        let prev = normalize(&[1.0, 1.0, 1.5]).unwrap();
        assert!(field.get_direction(&o, &prev, &mut rng).is_none());

        // 网格外无方向.
        assert!(field.get_direction(&[3.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &mut rng).is_none());
    }

    #[test]
    fn test_relative_threshold() {
        let field = crossing(0.9);
        let mut rng = StdRng::seed_from_u64(1);
        // y 峰被过滤, 只剩 x 峰, 而来向与 x 峰成 90 度.
        assert!(field
            .get_direction(&[0.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &mut rng)
            .is_none());
        let init = field.initial_directions(&[0.0, 0.0, 0.0]);
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].vector, [1.0, 0.0, 0.0]);

        let init = crossing(0.5).initial_directions(&[0.2, -0.3, 0.1]);
        assert_eq!(init.len(), 2);
        assert!(init[0].confidence > init[1].confidence);
    }

    #[test]
    fn test_init_err() {
        let dirs = Array5::<f64>::zeros((1, 1, 1, 1, 3));
        let vals = Array4::<f64>::zeros((1, 1, 1, 1));
        let peaks = PeaksVolume::new(dirs, vals, Affine::identity()).unwrap();
        assert!(PeakDirectionField::new(peaks.clone(), 0.0, 0.5, 25.0).is_err());
        assert!(PeakDirectionField::new(peaks.clone(), 30.0, 2.0, 25.0).is_err());
        assert!(PeakDirectionField::new(peaks, 30.0, 0.5, 95.0).is_err());
    }

    /// 与强峰只差 5 度的弱峰是重复峰: 即使它更贴近来向, 也选择强峰.
    #[test]
    fn test_near_duplicate_suppressed() {
        let off = normalize(&[deg_to_rad(5.0).cos(), deg_to_rad(5.0).sin(), 0.0]).unwrap();
        let mut dirs = Array5::<f64>::zeros((1, 1, 1, 2, 3));
        let mut vals = Array4::<f64>::zeros((1, 1, 1, 2));
        dirs[[0, 0, 0, 0, 0]] = 1.0;
        vals[[0, 0, 0, 0]] = 1.0;
        for c in 0..3 {
            dirs[[0, 0, 0, 1, c]] = off[c];
        }
        vals[[0, 0, 0, 1]] = 0.9;
        let peaks = PeaksVolume::new(dirs, vals, Affine::identity()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let prev = [deg_to_rad(6.0).cos(), deg_to_rad(6.0).sin(), 0.0];

        let field = PeakDirectionField::new(peaks.clone(), 30.0, 0.5, 25.0).unwrap();
        let d = field.get_direction(&[0.0, 0.0, 0.0], &prev, &mut rng).unwrap();
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.vector, [1.0, 0.0, 0.0]);
        assert_eq!(field.initial_directions(&[0.0, 0.0, 0.0]).len(), 1);

        // 分离角小于两峰夹角时, 两个峰都保留, 选择更贴近来向的一个.
        let field = PeakDirectionField::new(peaks, 30.0, 0.5, 2.0).unwrap();
        let d = field.get_direction(&[0.0, 0.0, 0.0], &prev, &mut rng).unwrap();
        assert_eq!(d.confidence, 0.9);
        assert_eq!(field.initial_directions(&[0.0, 0.0, 0.0]).len(), 2);
    }
}
