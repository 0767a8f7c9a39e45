//! 对 `flair-berry::dataset` 的更一层封装. 提供更直接的数据目录与加载器.

use flair_berry::consts::field;
use flair_berry::dataset::generic::{self, MaskLoader, ScanLoader};
use flair_berry::dataset::home_dataset_dir_with;
use flair_berry::BrainResult;
use std::env;
use std::path::{Path, PathBuf};

/// 若环境变量 `key` 非空, 则返回其值; 否则返回 `$HOME/dataset/flair/{sub}`.
/// 无法确定用户主目录时返回 `None`.
fn dir_from_env_or_home(key: &str, sub: &str) -> Option<PathBuf> {
    match env::var(key) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["flair", sub]),
    }
}

/// 获取 FLAIR 扫描目录.
///
/// 1. 若环境变量 `$FLAIR_SOURCE_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/flair/volume`.
#[inline]
pub fn source_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("FLAIR_SOURCE_DIR", "volume")
}

/// 获取脑掩膜输出目录.
///
/// 1. 若环境变量 `$FLAIR_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/flair/mask`.
#[inline]
pub fn output_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("FLAIR_OUTPUT_DIR", "mask")
}

/// 获取 FLAIR 扫描加载器.
#[inline]
pub fn scan_loader<P: AsRef<Path>>(path: P) -> BrainResult<ScanLoader> {
    generic::scan_loader(path)
}

/// 获取自动脑掩膜加载器. npz/mat 文件从 `brainMask` 字段读取.
#[inline]
pub fn mask_loader<P: AsRef<Path>>(path: P) -> BrainResult<MaskLoader> {
    generic::mask_loader(path, field::MASK)
}
