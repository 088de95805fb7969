//! 数据集操作.
//!
//! 实验数据按受试者分目录存放, 每个目录下为同一空间的 nifti 文件, 见 [`Subject`].

use std::path::{Path, PathBuf};

mod subject;

pub use subject::{subject_loader, DirnameBuilder, Subject, SubjectLoader, FA_FILE, MASK_FILE, PMF_FILE};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

#[cfg(test)]
mod tests {
    use super::{home_dataset_dir, home_dataset_dir_with};

    #[test]
    fn test_home_dataset_dir_with() {
        if let Some(base) = home_dataset_dir() {
            let p = home_dataset_dir_with(["hcp", "100307"]).unwrap();
            assert_eq!(p, base.join("hcp").join("100307"));
            assert!(p.ends_with("dataset/hcp/100307"));
        }
    }
}
