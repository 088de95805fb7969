//! 种子点生成.
//!
//! 种子按体素下标升序 (行优先) 排列, 同一体素内再按子体素偏移排列.
//! 每个种子都落在其体素的物理单元内, 即小数体素坐标与体素中心之差的每个分量位于 `[-0.5, 0.5)`.

use ndarray::ArrayView3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::Affine;
use crate::{ConfigError, GridAttr, MaskVolume, Point3};

/// 每个体素三个方向上的种子个数.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Density {
    x: usize,
    y: usize,
    z: usize,
}

impl Density {
    /// 创建密度. 任一分量为 0 时返回 `Err(ConfigError::ZeroDensity)`.
    pub fn new(x: usize, y: usize, z: usize) -> Result<Self, ConfigError> {
        if x == 0 || y == 0 || z == 0 {
            return Err(ConfigError::ZeroDensity);
        }
        Ok(Self { x, y, z })
    }

    /// 三个方向相同的密度.
    #[inline]
    pub fn uniform(n: usize) -> Result<Self, ConfigError> {
        Self::new(n, n, n)
    }

    /// 每个体素的种子个数.
    #[inline]
    pub fn per_voxel(&self) -> usize {
        self.x * self.y * self.z
    }

    /// `(x, y, z)`
    #[inline]
    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.x, self.y, self.z)
    }
}

impl Default for Density {
    /// 每个体素一个种子, 位于体素中心.
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

/// 单轴上等距分布的 `n` 个子体素偏移: `(a + 0.5) / n - 0.5`, `a = 0..n`.
#[inline]
fn offsets(n: usize) -> impl Iterator<Item = f64> + Clone {
    (0..n).map(move |a| (a as f64 + 0.5) / n as f64 - 0.5)
}

/// 在掩膜为真的每个体素内按密度 `density` 均匀放置种子, 并通过 `affine` 映射到物理坐标.
///
/// 掩膜全为假时返回空 `Vec`.
pub fn seeds_from_mask(mask: ArrayView3<bool>, affine: &Affine, density: Density) -> Vec<Point3> {
    let (dx, dy, dz) = density.as_tuple();
    let n_true = mask.iter().filter(|p| **p).count();
    let mut seeds = Vec::with_capacity(n_true * density.per_voxel());
    for ((i, j, k), _) in mask.indexed_iter().filter(|(_, p)| **p) {
        for (a, b, c) in itertools::iproduct!(offsets(dx), offsets(dy), offsets(dz)) {
            seeds.push(affine.apply([i as f64 + a, j as f64 + b, k as f64 + c]));
        }
    }
    seeds
}

/// 同 [`seeds_from_mask`], 使用掩膜自身的仿射矩阵.
#[inline]
pub fn seeds_from_mask_with(mask: &MaskVolume, density: Density) -> Vec<Point3> {
    seeds_from_mask(mask.data(), mask.affine(), density)
}

/// 在掩膜为真的每个体素内随机放置 `seeds_per_voxel` 个种子.
///
/// 偏移在每个方向上服从 `[-0.5, 0.5)` 的均匀分布. 给定 `rng_seed` 时结果可复现.
pub fn random_seeds_from_mask(
    mask: ArrayView3<bool>,
    affine: &Affine,
    seeds_per_voxel: usize,
    rng_seed: u64,
) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(rng_seed);
    let mut seeds = Vec::new();
    for ((i, j, k), _) in mask.indexed_iter().filter(|(_, p)| **p) {
        for _ in 0..seeds_per_voxel {
            let mut off = || rng.gen_range(-0.5..0.5);
            let v = [i as f64 + off(), j as f64 + off(), k as f64 + off()];
            seeds.push(affine.apply(v));
        }
    }
    seeds
}
