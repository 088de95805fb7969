//! 球面函数的峰值提取, 以及按体素存储的峰值方向场.
//!
//! # 并列规则
//!
//! 峰值按值降序排列; 值相同时按球面顶点下标升序. 去重时先出现者保留.
//! 这使得同一输入的结果总是稳定的.

use std::cmp::{Ordering, Reverse};

use binary_heap_plus::BinaryHeap;
use ndarray::{Array4, Array5, ArrayView1, Axis};
use ordered_float::OrderedFloat;

use crate::data::Affine;
use crate::direction::{check_angle, check_ratio, PmfVolume};
use crate::geom::{deg_to_rad, dot, normalize};
use crate::sphere::Sphere;
use crate::{ConfigError, GridAttr, Idx3d, Vec3};

/// 一个峰: 单位方向与峰值.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Peak {
    /// 单位方向.
    pub direction: Vec3,

    /// 峰值 (置信度).
    pub value: f64,

    /// 对应的球面顶点下标.
    pub vertex: usize,
}

#[inline]
fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// 峰值排序: 值大者优先, 值相同时下标小者优先.
#[inline]
fn peak_order(values: &[f64], a: usize, b: usize) -> Ordering {
    sanitize(values[a])
        .total_cmp(&sanitize(values[b]))
        .then_with(|| b.cmp(&a))
}

/// 求球面函数 `values` 在 `sphere` 上的局部极大值, 返回顶点下标.
///
/// 顶点 `i` 是局部极大值, 当且仅当其值为正, 不小于任何邻居, 并且没有值相等且下标更小的邻居
/// (平台只保留下标最小的顶点). 结果按值降序, 值相同时按下标升序.
///
/// 负值与非有限值视为 0. `values` 与球面顶点数不一致时, 返回 `Err(ConfigError::ShapeMismatch)`.
pub fn local_maxima(values: &[f64], sphere: &Sphere) -> Result<Vec<usize>, ConfigError> {
    check_len(values, sphere)?;
    Ok(maxima(values, sphere))
}

#[inline]
fn check_len(values: &[f64], sphere: &Sphere) -> Result<(), ConfigError> {
    if values.len() == sphere.len() {
        Ok(())
    } else {
        Err(ConfigError::ShapeMismatch {
            expected: vec![sphere.len()],
            actual: vec![values.len()],
        })
    }
}

fn maxima(values: &[f64], sphere: &Sphere) -> Vec<usize> {
    // 堆顶为最大的峰
    let mut heap: BinaryHeap<usize, _> = BinaryHeap::new_by(|a: &usize, b: &usize| peak_order(values, *a, *b));
    for i in 0..values.len() {
        let v = sanitize(values[i]);
        if v <= 0.0 {
            continue;
        }
        let is_max = sphere.neighbours(i).iter().all(|&j| {
            let w = sanitize(values[j]);
            w < v || (w == v && j > i)
        });
        if is_max {
            heap.push(i);
        }
    }
    let mut ans = Vec::with_capacity(heap.len());
    while let Some(i) = heap.pop() {
        ans.push(i);
    }
    ans
}

/// 求球面函数的峰值方向.
///
/// 1. 求局部极大值 (见 [`local_maxima`]);
/// 2. 丢弃值小于 `relative_peak_threshold * 最大值` 的峰;
/// 3. 按顺序遍历, 若当前峰与任一已保留峰的轴向夹角小于 `min_separation_angle` (单位: 度),
///   则丢弃 (重复峰抑制).
///
/// 全零输入返回空 `Vec`.
///
/// # 返回值
///
/// - `values` 与球面顶点数不一致时, 返回 `Err(ConfigError::ShapeMismatch)`;
/// - `relative_peak_threshold` 不在 `[0, 1]` 内时, 返回 `Err(ConfigError::InvalidThreshold)`;
/// - `min_separation_angle` 不在 `(0, 90]` 内时, 返回 `Err(ConfigError::AngleOutOfRange)`.
pub fn peak_directions(
    values: &[f64],
    sphere: &Sphere,
    relative_peak_threshold: f64,
    min_separation_angle: f64,
) -> Result<Vec<Peak>, ConfigError> {
    check_len(values, sphere)?;
    let relative_peak_threshold = check_ratio(relative_peak_threshold)?;
    let min_separation_angle = check_angle(min_separation_angle)?;
    Ok(find_peaks(values, sphere, relative_peak_threshold, min_separation_angle))
}

/// [`peak_directions`] 的主体. 调用方保证参数合法.
pub(crate) fn find_peaks(
    values: &[f64],
    sphere: &Sphere,
    relative_peak_threshold: f64,
    min_separation_angle: f64,
) -> Vec<Peak> {
    let maxima = maxima(values, sphere);
    let Some(&first) = maxima.first() else {
        return vec![];
    };
    let threshold = relative_peak_threshold * sanitize(values[first]);
    let cos_sep = deg_to_rad(min_separation_angle).cos();

    let mut kept: Vec<Peak> = Vec::with_capacity(4);
    for i in maxima {
        let value = sanitize(values[i]);
        if value < threshold {
            // 已按值降序, 后面的也不会满足.
            break;
        }
        let direction = *sphere.vertex(i);
        if kept
            .iter()
            .all(|p| dot(&p.direction, &direction).abs() <= cos_sep)
        {
            kept.push(Peak {
                direction,
                value,
                vertex: i,
            });
        }
    }
    kept
}

/// 按体素存储的峰值方向场: 每个体素至多 `npeaks` 个峰.
///
/// 峰值为 0 的槽位视为空. 每个体素的峰按值降序存储.
#[derive(Debug, Clone)]
pub struct PeaksVolume {
    /// `(x, y, z, npeaks, 3)`
    directions: Array5<f64>,

    /// `(x, y, z, npeaks)`
    values: Array4<f64>,

    affine: Affine,
}

impl GridAttr for PeaksVolume {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        let &[x, y, z, ..] = self.values.shape() else {
            unreachable!()
        };
        (x, y, z)
    }
}

impl PeaksVolume {
    /// 从原始数组创建.
    ///
    /// `directions` 形状为 `(x, y, z, npeaks, 3)`, `values` 形状为 `(x, y, z, npeaks)`.
    /// 方向会被单位化; 零向量或非有限方向对应的峰值会被置 0, 负值与非有限峰值也会被置 0.
    /// 随后每个体素内的峰按值降序重排 (稳定排序).
    pub fn new(
        mut directions: Array5<f64>,
        mut values: Array4<f64>,
        affine: Affine,
    ) -> Result<Self, ConfigError> {
        let ds = directions.shape().to_vec();
        let vs = values.shape().to_vec();
        if ds.len() != 5 || ds[4] != 3 || ds[..4] != vs[..] {
            let mut expected = vs.clone();
            expected.push(3);
            return Err(ConfigError::ShapeMismatch {
                expected,
                actual: ds,
            });
        }
        if values.is_empty() || vs[3] == 0 {
            return Err(ConfigError::EmptyGrid);
        }

        let npeaks = vs[3];
        let (x, y, z) = (vs[0], vs[1], vs[2]);
        let mut buf: Vec<(Vec3, f64)> = Vec::with_capacity(npeaks);
        for idx in itertools::iproduct!(0..x, 0..y, 0..z) {
            buf.clear();
            for n in 0..npeaks {
                let d = [
                    directions[[idx.0, idx.1, idx.2, n, 0]],
                    directions[[idx.0, idx.1, idx.2, n, 1]],
                    directions[[idx.0, idx.1, idx.2, n, 2]],
                ];
                let v = sanitize(values[[idx.0, idx.1, idx.2, n]]);
                match normalize(&d) {
                    Some(unit) if v > 0.0 => buf.push((unit, v)),
                    _ => buf.push(([0.0; 3], 0.0)),
                }
            }
            buf.sort_by_key(|(_, v)| Reverse(OrderedFloat(*v)));
            for (n, (d, v)) in buf.iter().enumerate() {
                values[[idx.0, idx.1, idx.2, n]] = *v;
                for c in 0..3 {
                    directions[[idx.0, idx.1, idx.2, n, c]] = d[c];
                }
            }
        }
        Ok(Self {
            directions,
            values,
            affine,
        })
    }

    /// 在 PMF 的每个体素上提取峰值方向, 每个体素保留至多 `npeaks` 个.
    ///
    /// 参数含义与校验同 [`peak_directions`]. `npeaks` 为 0 时返回 `Err(ConfigError::ZeroPeaks)`.
    pub fn from_pmf(
        pmf: &PmfVolume,
        npeaks: usize,
        relative_peak_threshold: f64,
        min_separation_angle: f64,
    ) -> Result<Self, ConfigError> {
        if npeaks == 0 {
            return Err(ConfigError::ZeroPeaks);
        }
        let relative_peak_threshold = check_ratio(relative_peak_threshold)?;
        let min_separation_angle = check_angle(min_separation_angle)?;
        let (x, y, z) = pmf.shape();
        let sphere = pmf.sphere();
        let voxels: Vec<Idx3d> = itertools::iproduct!(0..x, 0..y, 0..z).collect();
        let extract = |&(i, j, k): &Idx3d| -> Vec<Peak> {
            let values: Vec<f64> = pmf.values_at((i, j, k)).iter().map(|v| *v as f64).collect();
            let mut peaks = find_peaks(&values, sphere, relative_peak_threshold, min_separation_angle);
            peaks.truncate(npeaks);
            peaks
        };

        #[cfg(feature = "rayon")]
        let all: Vec<Vec<Peak>> = {
            use rayon::prelude::*;
            voxels.par_iter().map(extract).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let all: Vec<Vec<Peak>> = voxels.iter().map(extract).collect();

        let mut directions = Array5::<f64>::zeros((x, y, z, npeaks, 3));
        let mut values = Array4::<f64>::zeros((x, y, z, npeaks));
        for ((i, j, k), peaks) in voxels.into_iter().zip(all) {
            for (n, p) in peaks.iter().enumerate() {
                values[[i, j, k, n]] = p.value;
                for c in 0..3 {
                    directions[[i, j, k, n, c]] = p.direction[c];
                }
            }
        }
        Ok(Self {
            directions,
            values,
            affine: *pmf.affine(),
        })
    }

    /// 每个体素的峰槽位数.
    #[inline]
    pub fn npeaks(&self) -> usize {
        self.values.len_of(Axis(3))
    }

    /// 获取体素 `index` 的所有非空峰 `(方向, 峰值)`, 按值降序. 越界时 panic.
    pub fn peaks_at(&self, (i, j, k): Idx3d) -> impl Iterator<Item = (Vec3, f64)> + '_ {
        let values: ArrayView1<f64> = self.values.slice(ndarray::s![i, j, k, ..]);
        values
            .into_iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(move |(n, v)| {
                let d = self.directions.slice(ndarray::s![i, j, k, n, ..]);
                ([d[0], d[1], d[2]], *v)
            })
    }

    /// 体素 `index` 的最大峰值. 没有峰时为 0. 越界时 panic.
    #[inline]
    pub fn max_value_at(&self, (i, j, k): Idx3d) -> f64 {
        // 槽位已按值降序.
        self.values[[i, j, k, 0]]
    }
}

#[cfg(test)]
mod tests {
    use super::{local_maxima, peak_directions, PeaksVolume};
    use crate::ConfigError;
    use crate::data::Affine;
    use crate::direction::PmfVolume;
    use crate::geom::{axial_angle, dot, normalize};
    use crate::sphere::{default_sphere, Sphere};
    use crate::Vec3;
    use ndarray::{Array4, Array5};

    /// 以 `axes` 为纤维方向, 构造轴对称的球面函数 (每个方向贡献一个高斯瓣).
    fn lobes(sphere: &Sphere, axes: &[(Vec3, f64)]) -> Vec<f64> {
        sphere
            .vertices()
            .iter()
            .map(|v| {
                axes.iter()
                    .map(|(a, w)| {
                        let c = dot(v, &normalize(a).unwrap()).abs();
                        w * (-(1.0 - c * c) / 0.05).exp()
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_single_fibre() {
        let s = default_sphere();
        let values = lobes(s, &[([1.0, 0.0, 0.0], 1.0)]);
        let peaks = peak_directions(&values, s, 0.5, 25.0).unwrap();
        // 两个对径极大值只保留一个.
        assert_eq!(peaks.len(), 1);
        assert!(axial_angle(&peaks[0].direction, &[1.0, 0.0, 0.0]) < 5.0);
    }

    #[test]
    fn test_crossing_and_threshold() {
        let s = default_sphere();
        let values = lobes(s, &[([1.0, 0.0, 0.0], 1.0), ([0.0, 1.0, 0.0], 0.8)]);
        let peaks = peak_directions(&values, s, 0.5, 25.0).unwrap();
        assert_eq!(peaks.len(), 2);
        assert!(peaks[0].value >= peaks[1].value);
        assert!(axial_angle(&peaks[0].direction, &[1.0, 0.0, 0.0]) < 5.0);
        assert!(axial_angle(&peaks[1].direction, &[0.0, 1.0, 0.0]) < 5.0);

        // 相对阈值过高时, 次峰被过滤掉.
        assert_eq!(peak_directions(&values, s, 0.9, 25.0).unwrap().len(), 1);
    }

    #[test]
    fn test_min_separation() {
        let s = default_sphere();
        let a = normalize(&[1.0, 0.0, 0.0]).unwrap();
        let b = normalize(&[1.0, 0.35, 0.0]).unwrap(); // 约 19 度
        let values = lobes(s, &[(a, 1.0), (b, 1.0)]);
        for p in peak_directions(&values, s, 0.1, 25.0).unwrap().windows(2) {
            assert!(axial_angle(&p[0].direction, &p[1].direction) >= 25.0);
        }
    }

    #[test]
    fn test_equal_peaks_tie_break() {
        // 两个孤立顶点, 值相同: 下标小者在前, 且去重时保留.
        let s = Sphere::from_vertices(vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]], &[]).unwrap();
        assert_eq!(local_maxima(&[2.0, 2.0], &s).unwrap(), vec![0, 1]);
        let peaks = peak_directions(&[2.0, 2.0], &s, 0.5, 25.0).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].vertex, 0);

        // 平台: 相邻且相等, 只保留下标最小者.
        let s = Sphere::from_vertices(
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[(0, 1), (1, 2)],
        )
        .unwrap();
        assert_eq!(local_maxima(&[1.0, 1.0, 0.5], &s).unwrap(), vec![0]);
    }

    #[test]
    fn test_all_zero_and_invalid() {
        let s = default_sphere();
        let mut values = vec![0.0; s.len()];
        assert!(peak_directions(&values, s, 0.5, 25.0).unwrap().is_empty());
        values[3] = f64::NAN;
        values[4] = -1.0;
        assert!(local_maxima(&values, s).unwrap().is_empty());
    }

    #[test]
    fn test_peaks_volume_sorted() {
        let mut dirs = Array5::<f64>::zeros((1, 1, 1, 3, 3));
        let mut vals = Array4::<f64>::zeros((1, 1, 1, 3));
        // 槽位 0: 小峰; 槽位 1: 零向量; 槽位 2: 大峰 (未单位化).
        dirs[[0, 0, 0, 0, 1]] = 1.0;
        vals[[0, 0, 0, 0]] = 0.3;
        vals[[0, 0, 0, 1]] = 5.0;
        dirs[[0, 0, 0, 2, 0]] = 2.0;
        vals[[0, 0, 0, 2]] = 0.9;
        let pv = PeaksVolume::new(dirs, vals, Affine::identity()).unwrap();
        let peaks: Vec<_> = pv.peaks_at((0, 0, 0)).collect();
        assert_eq!(peaks, vec![([1.0, 0.0, 0.0], 0.9), ([0.0, 1.0, 0.0], 0.3)]);
        assert_eq!(pv.max_value_at((0, 0, 0)), 0.9);
        assert_eq!(pv.npeaks(), 3);
    }

    #[test]
    fn test_peaks_volume_shape_mismatch() {
        let dirs = Array5::<f64>::zeros((2, 1, 1, 3, 3));
        let vals = Array4::<f64>::zeros((1, 1, 1, 3));
        assert!(PeaksVolume::new(dirs, vals, Affine::identity()).is_err());
    }

    #[test]
    fn test_peak_args_err() {
        let s = default_sphere();
        let values = vec![1.0; s.len()];
        assert_eq!(
            peak_directions(&values, s, 1.5, 25.0).unwrap_err(),
            ConfigError::InvalidThreshold(1.5)
        );
        assert_eq!(
            peak_directions(&values, s, 0.5, 120.0).unwrap_err(),
            ConfigError::AngleOutOfRange(120.0)
        );
        assert!(matches!(
            local_maxima(&values[1..], s),
            Err(ConfigError::ShapeMismatch { .. })
        ));

        let pmf = PmfVolume::new(Array4::<f32>::ones((1, 1, 1, s.len())), Affine::identity(), s.clone()).unwrap();
        assert_eq!(PeaksVolume::from_pmf(&pmf, 0, 0.5, 25.0).unwrap_err(), ConfigError::ZeroPeaks);
        assert_eq!(
            PeaksVolume::from_pmf(&pmf, 2, 0.5, 0.0).unwrap_err(),
            ConfigError::AngleOutOfRange(0.0)
        );
        assert!(PeaksVolume::from_pmf(&pmf, 2, 0.5, 25.0).is_ok());
    }
}
