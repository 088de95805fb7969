use std::path::Path;

use ndarray::{Array4, ArrayView1, Axis, Ix4};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::{check_angle, check_ratio, Direction, DirectionField};
use crate::consts::{
    DEFAULT_MIN_SEPARATION_ANGLE, DEFAULT_PMF_THRESHOLD, DEFAULT_RELATIVE_PEAK_THRESHOLD,
};
use crate::data::{interp, read_nifti_dyn, Affine};
use crate::geom::{deg_to_rad, dot, normalize, orient_like};
use crate::peaks::find_peaks;
use crate::sphere::Sphere;
use crate::{ConfigError, GridAttr, Idx3d, Point3, TrackError, TrackResult, Vec3};

/// 离散球面上的方向概率分布场 (PMF).
///
/// 数据形状为 `(x, y, z, n)`, 其中 `n` 等于球面顶点数; 第 `n` 个分量是
/// 该体素处沿第 `n` 个球面顶点方向的 (未归一化) 概率.
#[derive(Debug, Clone)]
pub struct PmfVolume {
    data: Array4<f32>,
    affine: Affine,
    sphere: Sphere,
}

impl GridAttr for PmfVolume {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        let (x, y, z, _) = self.data.dim();
        (x, y, z)
    }
}

impl PmfVolume {
    /// 由原始数据创建.
    ///
    /// # 返回值
    ///
    /// - 第四维长度与球面顶点数不一致时, 返回 `Err(ConfigError::ShapeMismatch)`;
    /// - 数据为空时, 返回 `Err(ConfigError::EmptyGrid)`;
    /// - 含有负值或非有限值时, 返回 `Err(ConfigError::InvalidPmf)`.
    pub fn new(data: Array4<f32>, affine: Affine, sphere: Sphere) -> Result<Self, ConfigError> {
        let (x, y, z, n) = data.dim();
        if n != sphere.len() {
            return Err(ConfigError::ShapeMismatch {
                expected: vec![x, y, z, sphere.len()],
                actual: data.shape().to_vec(),
            });
        }
        if data.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::InvalidPmf);
        }
        Ok(Self {
            data,
            affine,
            sphere,
        })
    }

    /// 打开 nii 文件格式的四维 PMF, 第四维对应 `sphere` 的顶点.
    pub fn open<P: AsRef<Path>>(path: P, sphere: Sphere) -> TrackResult<Self> {
        let path = path.as_ref();
        let (data, affine) = read_nifti_dyn(path)?;
        let data = data
            .into_dimensionality::<Ix4>()
            .map_err(|e| TrackError::Malformed(format!("{}: 期望四维数据 ({e})", path.display())))?;
        Ok(Self::new(data.as_standard_layout().into_owned(), affine, sphere)?)
    }

    /// PMF 所用的离散球面.
    #[inline]
    pub fn sphere(&self) -> &Sphere {
        &self.sphere
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ndarray::ArrayView4<'_, f32> {
        self.data.view()
    }

    /// 体素 `index` 处的 PMF. 越界时 panic.
    #[inline]
    pub fn values_at(&self, (i, j, k): Idx3d) -> ArrayView1<'_, f32> {
        self.data.slice(ndarray::s![i, j, k, ..])
    }

    /// 在物理坐标 `point` 处三线性插值, 结果写入 `out`. 若在网格外, 返回 `false`.
    pub fn interpolate(&self, point: &Point3, out: &mut Vec<f64>) -> bool {
        let v = self.to_voxel(point);
        self.contains_voxel(&v) && interp::trilinear_vector(self.data.view(), &v, out)
    }

    /// 顶点个数.
    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.data.len_of(Axis(3))
    }
}

/// PMF 方向场的取向模式.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PmfMode {
    /// 在锥形范围内按 PMF 权重随机采样.
    Probabilistic,

    /// 在锥形范围内取 PMF 最大的顶点. 并列时取下标最小者.
    DeterministicMaximum,
}

/// 基于 PMF 的方向场.
///
/// 每一步:
///
/// 1. 在当前位置对 PMF 做三线性插值;
/// 2. 小于 `pmf_threshold * 最大值` 的分量置 0;
/// 3. 与来向轴向夹角大于 `max_angle` 的顶点置 0;
/// 4. 按 [`PmfMode`] 选择一个顶点, 翻转到与来向同侧.
///
/// 种子处的初始方向由插值 PMF 的峰值方向给出 (见 [`crate::peaks::peak_directions`]).
#[derive(Debug, Clone)]
pub struct PmfDirectionField {
    pmf: PmfVolume,
    mode: PmfMode,
    max_angle: f64,
    cos_max_angle: f64,
    pmf_threshold: f64,
    relative_peak_threshold: f64,
    min_separation_angle: f64,
}

impl PmfDirectionField {
    /// 以默认阈值创建方向场. `max_angle` 单位为度, 须位于 `(0, 90]`.
    pub fn new(pmf: PmfVolume, mode: PmfMode, max_angle: f64) -> Result<Self, ConfigError> {
        let max_angle = check_angle(max_angle)?;
        Ok(Self {
            pmf,
            mode,
            max_angle,
            cos_max_angle: deg_to_rad(max_angle).cos(),
            pmf_threshold: DEFAULT_PMF_THRESHOLD,
            relative_peak_threshold: DEFAULT_RELATIVE_PEAK_THRESHOLD,
            min_separation_angle: DEFAULT_MIN_SEPARATION_ANGLE,
        })
    }

    /// 设置 PMF 相对阈值, 须位于 `[0, 1]`.
    pub fn with_pmf_threshold(mut self, pmf_threshold: f64) -> Result<Self, ConfigError> {
        self.pmf_threshold = check_ratio(pmf_threshold)?;
        Ok(self)
    }

    /// 设置初始方向提取时的相对峰值阈值 (`[0, 1]`) 与最小分离角 (`(0, 90]` 度).
    pub fn with_peak_threshold(
        mut self,
        relative_peak_threshold: f64,
        min_separation_angle: f64,
    ) -> Result<Self, ConfigError> {
        self.relative_peak_threshold = check_ratio(relative_peak_threshold)?;
        self.min_separation_angle = check_angle(min_separation_angle)?;
        Ok(self)
    }

    /// 取向模式.
    #[inline]
    pub fn mode(&self) -> PmfMode {
        self.mode
    }

    /// 最大转角, 单位为度.
    #[inline]
    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }

    /// 底层 PMF.
    #[inline]
    pub fn pmf(&self) -> &PmfVolume {
        &self.pmf
    }

    /// 在 `point` 处按阈值与锥形约束过滤后的 PMF. 在网格外或 PMF 全零时返回 `None`.
    fn masked_pmf(&self, point: &Point3, previous: &Vec3) -> Option<Vec<f64>> {
        let mut values = Vec::with_capacity(self.pmf.n_vertices());
        if !self.pmf.interpolate(point, &mut values) {
            return None;
        }
        let max = values.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return None;
        }
        let threshold = self.pmf_threshold * max;
        for (v, u) in values.iter_mut().zip(self.pmf.sphere().vertices()) {
            if *v < threshold || dot(u, previous).abs() < self.cos_max_angle {
                *v = 0.0;
            }
        }
        Some(values)
    }
}

impl DirectionField for PmfDirectionField {
    #[inline]
    fn grid(&self) -> (Idx3d, &Affine) {
        (self.pmf.shape(), self.pmf.affine())
    }

    fn initial_directions(&self, point: &Point3) -> Vec<Direction> {
        let mut values = Vec::with_capacity(self.pmf.n_vertices());
        if !self.pmf.interpolate(point, &mut values) {
            return vec![];
        }
        find_peaks(
            &values,
            self.pmf.sphere(),
            self.relative_peak_threshold,
            self.min_separation_angle,
        )
        .into_iter()
        .map(|p| Direction {
            vector: p.direction,
            confidence: p.value,
        })
        .collect()
    }

    fn get_direction<R: Rng + ?Sized>(
        &self,
        point: &Point3,
        previous: &Vec3,
        rng: &mut R,
    ) -> Option<Direction> {
        let previous = normalize(previous)?;
        let values = self.masked_pmf(point, &previous)?;

        let index = match self.mode {
            PmfMode::Probabilistic => {
                // 全零 (锥内没有质量) 时构造失败.
                let dist = WeightedIndex::<f64>::new(&values).ok()?;
                dist.sample(rng)
            }
            PmfMode::DeterministicMaximum => {
                let mut best = (0, 0.0);
                for (i, v) in values.iter().enumerate() {
                    if *v > best.1 {
                        best = (i, *v);
                    }
                }
                if best.1 <= 0.0 {
                    return None;
                }
                best.0
            }
        };
        Some(Direction {
            vector: orient_like(self.pmf.sphere().vertex(index), &previous),
            confidence: values[index],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PmfDirectionField, PmfMode, PmfVolume};
    use crate::data::Affine;
    use crate::direction::DirectionField;
    use crate::geom::{axial_angle, dot};
    use crate::sphere::Sphere;
    use crate::ConfigError;
    use ndarray::Array4;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 3x3x3 网格, 每个体素都是同一个沿 `axis` 的窄瓣 PMF.
    fn lobe_volume(axis: [f64; 3]) -> PmfVolume {
        let sphere = Sphere::icosphere(2);
        let n = sphere.len();
        let lobe: Vec<f32> = sphere
            .vertices()
            .iter()
            .map(|v| {
                let c = dot(v, &axis).abs();
                (-(1.0 - c * c) / 0.05).exp() as f32
            })
            .collect();
        let data = Array4::from_shape_fn((3, 3, 3, n), |(_, _, _, m)| lobe[m]);
        PmfVolume::new(data, Affine::identity(), sphere).unwrap()
    }

    #[test]
    fn test_pmf_volume_init_err() {
        let sphere = Sphere::icosphere(0);
        let data = Array4::<f32>::zeros((2, 2, 2, 5));
        assert!(matches!(
            PmfVolume::new(data, Affine::identity(), sphere.clone()),
            Err(ConfigError::ShapeMismatch { .. })
        ));
        let mut data = Array4::<f32>::zeros((2, 2, 2, 12));
        data[[1, 1, 1, 3]] = -0.5;
        assert_eq!(
            PmfVolume::new(data, Affine::identity(), sphere).unwrap_err(),
            ConfigError::InvalidPmf
        );
    }

    #[test]
    fn test_deterministic_maximum() {
        let field = PmfDirectionField::new(lobe_volume([1.0, 0.0, 0.0]), PmfMode::DeterministicMaximum, 30.0)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let p = [1.0, 1.0, 1.0];

        let d = field.get_direction(&p, &[-1.0, 0.1, 0.0], &mut rng).unwrap();
        assert!(axial_angle(&d.vector, &[1.0, 0.0, 0.0]) < 1e-9);
        assert!(d.vector[0] < 0.0);

        // 来向与 x 轴垂直: 锥内 PMF 被阈值清零.
        assert!(field.get_direction(&p, &[0.0, 0.0, 1.0], &mut rng).is_none());
        // 网格外.
        assert!(field.get_direction(&[5.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &mut rng).is_none());

        let init = field.initial_directions(&p);
        assert_eq!(init.len(), 1);
        assert!(axial_angle(&init[0].vector, &[1.0, 0.0, 0.0]) < 1e-9);
    }

    #[test]
    fn test_probabilistic_within_cone_and_reproducible() {
        let field = PmfDirectionField::new(lobe_volume([0.0, 1.0, 0.0]), PmfMode::Probabilistic, 30.0)
            .unwrap()
            .with_pmf_threshold(0.0)
            .unwrap();
        let p = [1.2, 0.7, 1.4];
        let prev = [0.0, 1.0, 0.0];

        let draw = |seed: u64| -> Vec<[f64; 3]> {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..64)
                .map(|_| field.get_direction(&p, &prev, &mut rng).unwrap().vector)
                .collect()
        };
        let a = draw(7);
        for v in a.iter() {
            assert!(dot(v, &prev) >= 0.0);
            assert!(axial_angle(v, &prev) <= 30.0 + 1e-9);
        }
        assert_eq!(a, draw(7));
        assert_ne!(a, draw(8));
    }

    #[test]
    fn test_builder_err() {
        let field = PmfDirectionField::new(lobe_volume([1.0, 0.0, 0.0]), PmfMode::Probabilistic, 30.0).unwrap();
        assert!(field.clone().with_pmf_threshold(1.5).is_err());
        assert!(field.with_peak_threshold(0.5, 120.0).is_err());
    }
}
