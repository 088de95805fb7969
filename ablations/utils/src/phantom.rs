//! 合成数据: 两束纤维交叉的体模.
//!
//! 体模为 `(n, n, depth)` 的网格. 纤维束 A 沿 x 方向, 占据 `n / 3 <= j < 2n / 3` 的带状区域;
//! 纤维束 B 沿 y 方向, 占据 `n / 3 <= i < 2n / 3` 的带状区域. 两者在中心交叉.

use ndarray::{Array3, Array4};
use tract_berry::geom::dot;
use tract_berry::peaks::PeaksVolume;
use tract_berry::sphere::{default_sphere, Sphere};
use tract_berry::direction::PmfVolume;
use tract_berry::{Affine, GridAttr, MaskVolume, ScalarVolume, Vec3};

/// 瓣宽度参数, 越小越尖锐.
const LOBE_WIDTH: f64 = 0.08;

/// 纤维内的各向同性成分.
const ISOTROPIC: f64 = 0.01;

/// 交叉纤维体模.
pub struct Phantom {
    /// 各向异性分数: 纤维内 0.7 (交叉区 0.5), 其余 0.05.
    pub fa: ScalarVolume,

    /// 种子掩膜: 纤维束 A 的左端一列体素.
    pub seed_mask: MaskVolume,

    /// 每体素的方向分布.
    pub pmf: PmfVolume,

    /// 由 `pmf` 提取的峰值.
    pub peaks: PeaksVolume,
}

/// 沿 `axis` 的轴对称瓣.
fn lobe(sphere: &Sphere, axis: &Vec3, weight: f64, out: &mut [f64]) {
    for (o, v) in out.iter_mut().zip(sphere.vertices()) {
        let c = dot(v, axis).abs();
        *o += weight * (-(1.0 - c * c) / LOBE_WIDTH).exp();
    }
}

/// 构建体模. 体素尺寸为 `zoom` 毫米 (各向同性).
pub fn crossing(n: usize, depth: usize, zoom: f64) -> Phantom {
    assert!(n >= 3 && depth >= 1);
    let sphere = default_sphere();
    let affine = Affine::from_zooms([zoom; 3]).unwrap();
    let band = |c: usize| c >= n / 3 && c < 2 * n / 3;

    let mut fa = Array3::<f32>::from_elem((n, n, depth), 0.05);
    let mut pmf = Array4::<f32>::zeros((n, n, depth, sphere.len()));
    let mut buf = vec![0.0; sphere.len()];
    for ((i, j, k), v) in fa.indexed_iter_mut() {
        let (a, b) = (band(j), band(i));
        let base = if a || b { ISOTROPIC } else { 0.0 };
        buf.fill(base);
        if a {
            lobe(sphere, &[1.0, 0.0, 0.0], 1.0, &mut buf);
        }
        if b {
            lobe(sphere, &[0.0, 1.0, 0.0], 1.0, &mut buf);
        }
        *v = match (a, b) {
            (true, true) => 0.5,
            (true, false) | (false, true) => 0.7,
            _ => 0.05,
        };
        for (m, w) in buf.iter().enumerate() {
            pmf[[i, j, k, m]] = *w as f32;
        }
    }

    let mut seed_mask = Array3::from_elem((n, n, depth), false);
    for j in (0..n).filter(|j| band(*j)) {
        for k in 0..depth {
            seed_mask[(1, j, k)] = true;
        }
    }

    let fa = ScalarVolume::new(fa, affine).unwrap();
    let seed_mask = MaskVolume::new(seed_mask, affine).unwrap();
    let pmf = PmfVolume::new(pmf, affine, sphere.clone()).unwrap();
    let peaks = PeaksVolume::from_pmf(&pmf, 3, 0.5, 25.0).unwrap();
    debug_assert!(fa.same_space(&pmf));
    Phantom {
        fa,
        seed_mask,
        pmf,
        peaks,
    }
}
