use std::io;
use std::path::{Path, PathBuf};

use crate::direction::PmfVolume;
use crate::sphere::Sphere;
use crate::{ConfigError, GridAttr, MaskVolume, ScalarVolume, TrackResult};

/// FA 文件名.
pub const FA_FILE: &str = "fa.nii.gz";

/// 脑掩膜文件名.
pub const MASK_FILE: &str = "mask.nii.gz";

/// PMF 文件名 (可选).
pub const PMF_FILE: &str = "pmf.nii.gz";

/// 一个受试者的追踪输入.
///
/// 目录下必须有 [`FA_FILE`] 与 [`MASK_FILE`], 可以有 [`PMF_FILE`].
/// 所有文件必须处于同一空间 (形状与仿射矩阵一致).
#[derive(Debug, Clone)]
pub struct Subject {
    /// 各向异性分数.
    pub fa: ScalarVolume,

    /// 脑掩膜.
    pub mask: MaskVolume,

    /// 离散球面上的方向分布. 第四维对应打开时给定的球面.
    pub pmf: Option<PmfVolume>,
}

impl Subject {
    /// 打开受试者目录 `dir`. PMF 的第四维须与 `sphere` 的顶点一一对应.
    ///
    /// # 返回值
    ///
    /// - 文件缺失或格式错误时, 返回相应的 I/O 或 nifti 错误;
    /// - 文件之间不在同一空间时, 返回 `ConfigError::GridMismatch`.
    pub fn open<P: AsRef<Path>>(dir: P, sphere: &Sphere) -> TrackResult<Self> {
        let dir = dir.as_ref();
        let fa = ScalarVolume::open(dir.join(FA_FILE))?;
        let mask = MaskVolume::open(dir.join(MASK_FILE))?;
        if !fa.same_space(&mask) {
            return Err(ConfigError::GridMismatch.into());
        }

        let pmf_path = dir.join(PMF_FILE);
        let pmf = if pmf_path.is_file() {
            let pmf = PmfVolume::open(pmf_path, sphere.clone())?;
            if !fa.same_space(&pmf) {
                return Err(ConfigError::GridMismatch.into());
            }
            Some(pmf)
        } else {
            None
        };
        log::debug!(
            "打开受试者 {}: 形状 {:?}, 掩膜内 {} 个体素, PMF: {}",
            dir.display(),
            fa.shape(),
            mask.count(),
            pmf.is_some()
        );
        Ok(Self { fa, mask, pmf })
    }
}

/// 目录名构造器. 接受受试者编号, 获得目录名.
pub type DirnameBuilder = fn(u32) -> String;

/// 从受试者编号、根目录、目录名构造器来创建受试者加载器.
///
/// # 注意
///
/// 1. `root` 不是目录时, 返回 `Err(TrackError::Io)` (`NotFound`).
/// 2. `ids` 的所有取值 `id` 必须在 `root` 下有形如 `builder(id)` 的受试者目录,
///   否则加载器在迭代时会返回 `Err`.
pub fn subject_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    ids: I,
    root: P,
    builder: DirnameBuilder,
    sphere: Sphere,
) -> TrackResult<SubjectLoader> {
    let root = root.as_ref().to_owned();
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("数据集根目录不存在: {}", root.display()),
        )
        .into());
    }

    let mut ids: Vec<u32> = ids.into_iter().collect();
    ids.reverse();

    Ok(SubjectLoader {
        root,
        ids_rev: ids,
        builder,
        sphere,
    })
}

/// 受试者加载器, 按给定编号顺序逐个打开.
#[derive(Debug)]
pub struct SubjectLoader {
    root: PathBuf,
    ids_rev: Vec<u32>,
    builder: DirnameBuilder,
    sphere: Sphere,
}

impl Iterator for SubjectLoader {
    type Item = (u32, TrackResult<Subject>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids_rev.pop()?;

        self.root.push((self.builder)(id));
        let data = Subject::open(self.root.as_path(), &self.sphere);
        self.root.pop();

        Some((id, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.ids_rev.len(), Some(self.ids_rev.len()))
    }
}

impl ExactSizeIterator for SubjectLoader {
    #[inline]
    fn len(&self) -> usize {
        self.ids_rev.len()
    }
}
