use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView, ArrayViewMut, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::{ConfigError, Idx3d, Point3, TrackError, TrackResult};

mod affine;
pub(crate) mod interp;

pub use affine::Affine;

/// 三维体素网格: 体素数据 + 体素到物理坐标的仿射变换.
///
/// 索引 `(i, j, k)` 与 nifti 的 `(x, y, z)` 顺序一致.
#[derive(Debug, Clone)]
pub struct VoxelGrid<T> {
    data: Array3<T>,
    affine: Affine,
}

/// 三维标量场 (如 FA), 值以 `f32` 保存.
pub type ScalarVolume = VoxelGrid<f32>;

/// 三维二值掩膜.
pub type MaskVolume = VoxelGrid<bool>;

/// 体素网格的共用属性和部分通用操作.
pub trait GridAttr {
    /// 获取仿射矩阵.
    fn affine(&self) -> &Affine;

    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (x, y, z) = self.shape();
        x * y * z
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (i0, j0, k0): &Idx3d) -> bool {
        let (i, j, k) = self.shape();
        *i0 < i && *j0 < j && *k0 < k
    }

    /// 获取三个体素轴方向的体素尺寸, 以毫米为单位.
    #[inline]
    fn zooms(&self) -> [f64; 3] {
        self.affine().zooms()
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel_volume(&self) -> f64 {
        self.zooms().iter().product()
    }

    /// 物理坐标 -> 小数体素坐标.
    #[inline]
    fn to_voxel(&self, world: &Point3) -> [f64; 3] {
        self.affine().apply_inverse(world)
    }

    /// 小数体素坐标 -> 物理坐标.
    #[inline]
    fn to_world(&self, voxel: [f64; 3]) -> Point3 {
        self.affine().apply(voxel)
    }

    /// 小数体素坐标是否落在网格内. 每个体素占据以其中心为原点,
    /// 边长为 1 的立方体, 即每个分量满足 `-0.5 <= v < len - 0.5`.
    #[inline]
    fn contains_voxel(&self, v: &[f64; 3]) -> bool {
        voxel_in_shape(self.shape(), v)
    }

    /// 物理坐标是否落在网格内.
    #[inline]
    fn contains_point(&self, world: &Point3) -> bool {
        self.contains_voxel(&self.to_voxel(world))
    }

    /// 物理坐标所在体素的索引. 若在网格外, 返回 `None`.
    fn nearest_voxel(&self, world: &Point3) -> Option<Idx3d> {
        let v = self.to_voxel(world);
        self.contains_voxel(&v).then(|| {
            let r = |c: f64| (c + 0.5).floor() as usize;
            (r(v[0]), r(v[1]), r(v[2]))
        })
    }

    /// 网格在物理空间的轴对齐包围盒 `(最小角, 最大角)`.
    fn world_bounds(&self) -> ([f64; 3], [f64; 3]) {
        let (i, j, k) = self.shape();
        let hi = [i as f64 - 0.5, j as f64 - 0.5, k as f64 - 0.5];
        let mut lo_w = [f64::INFINITY; 3];
        let mut hi_w = [f64::NEG_INFINITY; 3];
        for corner in 0..8 {
            let pick = |axis: usize| {
                if corner & (1 << axis) == 0 {
                    -0.5
                } else {
                    hi[axis]
                }
            };
            let w = self.to_world([pick(0), pick(1), pick(2)]);
            for a in 0..3 {
                lo_w[a] = lo_w[a].min(w[a]);
                hi_w[a] = hi_w[a].max(w[a]);
            }
        }
        (lo_w, hi_w)
    }

    /// 两个网格是否处于同一空间 (形状一致, 仿射矩阵在容差内一致).
    #[inline]
    fn same_space<G: GridAttr + ?Sized>(&self, other: &G) -> bool {
        self.shape() == other.shape() && self.affine().approx_eq(other.affine())
    }
}

impl<T> GridAttr for VoxelGrid<T> {
    #[inline]
    fn affine(&self) -> &Affine {
        &self.affine
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl<T> Index<Idx3d> for VoxelGrid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<Idx3d> for VoxelGrid<T> {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T> VoxelGrid<T> {
    /// 由体素数据和仿射矩阵直接创建. 数据为空时返回 `Err(ConfigError::EmptyGrid)`.
    pub fn new(data: Array3<T>, affine: Affine) -> Result<Self, ConfigError> {
        if data.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        Ok(Self { data, affine })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, T, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, T, Ix3> {
        self.data.view_mut()
    }

    /// 获取给定索引的体素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, index: Idx3d) -> Option<&T> {
        self.data.get(index)
    }

    /// 消费自我, 获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<T> {
        self.data
    }

    /// 物理坐标所在体素的值 (最近邻). 若在网格外, 返回 `None`.
    #[inline]
    pub fn value_at(&self, world: &Point3) -> Option<&T> {
        self.nearest_voxel(world).map(|idx| &self.data[idx])
    }

    /// 对每个体素施加 `f`, 得到同一空间下的新网格.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> VoxelGrid<U> {
        VoxelGrid {
            data: self.data.map(f),
            affine: self.affine,
        }
    }
}

impl ScalarVolume {
    /// 打开 nii 文件格式的三维标量场. `path` 为 nii 文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let (data, affine) = read_nifti_3d(path.as_ref())?;
        Ok(Self::new(data, affine)?)
    }

    /// 在物理坐标 `world` 处三线性插值. 若在网格外, 返回 `None`.
    #[inline]
    pub fn interpolate(&self, world: &Point3) -> Option<f64> {
        let v = self.to_voxel(world);
        if !self.contains_voxel(&v) {
            return None;
        }
        interp::trilinear(self.data.view(), &v)
    }
}

impl MaskVolume {
    /// 打开 nii 文件格式的三维掩膜. 体素值大于 0 即视为掩膜内.
    pub fn open<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let (data, affine) = read_nifti_3d(path.as_ref())?;
        Ok(Self::new(data.mapv(|v| v > 0.0), affine)?)
    }

    /// 由标量场阈值化得到掩膜: `value >= threshold` 的体素在掩膜内.
    #[inline]
    pub fn from_threshold(field: &ScalarVolume, threshold: f32) -> Self {
        field.map(|v| *v >= threshold)
    }

    /// 物理坐标是否落在掩膜为真的体素中. 若在网格外, 返回 `None`.
    #[inline]
    pub fn contains(&self, world: &Point3) -> Option<bool> {
        self.value_at(world).copied()
    }

    /// 掩膜内体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 收集掩膜内所有体素的下标, 结果按行优先 (升序) 存储.
    pub fn true_voxels(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| (*p).then_some(pos))
            .collect()
    }
}

/// 读取 nifti 文件, 返回 `(x, y, z)` 顺序, 标准内存布局的三维数组与仿射矩阵.
/// 小数体素坐标 `v` 是否落在形状为 `shape` 的网格内. 见 [`GridAttr::contains_voxel`].
#[inline]
pub(crate) fn voxel_in_shape((i, j, k): Idx3d, v: &[f64; 3]) -> bool {
    [i, j, k]
        .iter()
        .zip(v.iter())
        .all(|(&len, &c)| c >= -0.5 && c < len as f64 - 0.5)
}

pub(crate) fn read_nifti_3d(path: &Path) -> TrackResult<(Array3<f32>, Affine)> {
    let (data, affine) = read_nifti_dyn(path)?;
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|e| TrackError::Malformed(format!("{}: 期望三维数据 ({e})", path.display())))?;
    Ok((data.as_standard_layout().into_owned(), affine))
}

/// 读取任意维度的 nifti 文件. 体素值统一转换为 `f32`.
pub(crate) fn read_nifti_dyn(path: &Path) -> TrackResult<(ArrayD<f32>, Affine)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let affine = Affine::from_nifti_header(obj.header())?;

    // nifti 体数据本身就是 `(x, y, z, ...)` 顺序 (Fortran 内存布局).
    let data = obj.into_volume().into_ndarray::<f32>()?;
    Ok((data, affine))
}
