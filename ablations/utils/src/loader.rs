//! 对 `tract-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use std::env;
use std::path::{Path, PathBuf};

use tract_berry::dataset::{self, SubjectLoader};
use tract_berry::TrackResult;
use tract_berry::sphere::default_sphere;

/// 获取追踪数据集基本路径.
///
/// 1. 若环境变量 `$TRACT_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tract`.
pub fn data_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("TRACT_DATA_DIR") {
        PathBuf::from(d)
    } else {
        dataset::home_dataset_dir_with(["tract"]).unwrap()
    }
}

/// 受试者目录名: `sub-001`, `sub-002`, ...
#[inline]
fn subject_dirname(id: u32) -> String {
    format!("sub-{id:03}")
}

/// 获取受试者加载器. PMF 按默认球面解释. `path` 不是目录时返回 `Err`.
pub fn subject_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    ids: I,
    path: P,
) -> TrackResult<SubjectLoader> {
    dataset::subject_loader(ids, path, subject_dirname, default_sphere().clone())
}

/// 从 `$TRACT_DATA_DIR` 或者 `$HOME/dataset/tract` 下加载受试者.
#[inline]
pub fn subject_loader_from_env_or_home<I: IntoIterator<Item = u32>>(ids: I) -> TrackResult<SubjectLoader> {
    subject_loader(ids, data_dir_from_env_or_home())
}
