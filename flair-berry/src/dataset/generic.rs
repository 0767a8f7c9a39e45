//! 通用 FLAIR 扫描/脑掩膜数据加载器.
//!
//! 提供迭代器风格的数据集获取模式. 目录中的文件按文件名升序访问,
//! 不受支持格式的文件被忽略.

use crate::dataset::io::VolumeFormat;
use crate::error::BrainResult;
use crate::{BrainMask, FlairScan};
use std::path::{Path, PathBuf};

/// 按文件名升序列出 `dir` 下所有受支持格式的体数据文件.
pub fn volume_files<P: AsRef<Path>>(dir: P) -> BrainResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && VolumeFormat::from_path(&path).is_ok() {
            files.push(path);
        }
    }
    files.sort_unstable_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// 获取路径的文件名部分.
#[inline]
fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 从目录 `dir` 创建 FLAIR 扫描 ([`FlairScan`]) 加载器.
///
/// # 注意
///
/// 1. 目录无法读取时返回 `Err`.
/// 2. 单个文件打开失败不会中止迭代, 而是在对应位置返回 `Err`.
pub fn scan_loader<P: AsRef<Path>>(dir: P) -> BrainResult<ScanLoader> {
    let mut files = volume_files(dir)?;
    files.reverse();
    Ok(ScanLoader { files_rev: files })
}

/// 3D FLAIR 扫描数据加载器. 迭代返回 `(文件名, 扫描)`.
#[derive(Debug)]
pub struct ScanLoader {
    files_rev: Vec<PathBuf>,
}

impl Iterator for ScanLoader {
    type Item = (String, BrainResult<FlairScan>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files_rev.pop()?;
        Some((file_name_of(&path), FlairScan::open(&path)))
    }
}

impl ExactSizeIterator for ScanLoader {
    #[inline]
    fn len(&self) -> usize {
        self.files_rev.len()
    }
}

/// 从目录 `dir` 创建脑掩膜 ([`BrainMask`]) 加载器. npz/mat 文件从字段 `field` 读取.
///
/// # 注意
///
/// 1. 目录无法读取时返回 `Err`.
/// 2. 单个文件打开失败不会中止迭代, 而是在对应位置返回 `Err`.
pub fn mask_loader<P: AsRef<Path>>(dir: P, field: &str) -> BrainResult<MaskLoader> {
    let mut files = volume_files(dir)?;
    files.reverse();
    Ok(MaskLoader {
        files_rev: files,
        field: field.to_owned(),
    })
}

/// 3D 脑掩膜数据加载器. 迭代返回 `(文件名, 掩膜)`.
#[derive(Debug)]
pub struct MaskLoader {
    files_rev: Vec<PathBuf>,
    field: String,
}

impl Iterator for MaskLoader {
    type Item = (String, BrainResult<BrainMask>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files_rev.pop()?;
        Some((file_name_of(&path), BrainMask::open(&path, &self.field)))
    }
}

impl ExactSizeIterator for MaskLoader {
    #[inline]
    fn len(&self) -> usize {
        self.files_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::field;
    use crate::consts::gray::*;
    use crate::error::BrainError;

    #[test]
    fn test_loader_order_and_filter() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("flair-berry-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut mask = BrainMask::zeros((2, 3, 3));
        mask[(1, 1, 1)] = MASK_BRAIN;
        mask.save(dir.join("b.npz"), field::MASK).unwrap();
        mask.save(dir.join("a.npy"), field::MASK).unwrap();
        mask.save(dir.join("d.mat"), field::MASK).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.join("c.npz"), "broken").unwrap();

        let loader = mask_loader(&dir, field::MASK).unwrap();
        assert_eq!(loader.len(), 4);
        let items: Vec<_> = loader.collect();
        assert_eq!(items[0].0, "a.npy");
        assert_eq!(items[1].0, "b.npz");
        assert_eq!(items[0].1.as_ref().unwrap().count_brain(), 1);
        assert_eq!(items[1].1.as_ref().unwrap().count_brain(), 1);
        assert!(items[2].1.is_err());
        assert_eq!(items[3].0, "d.mat");
        assert_eq!(items[3].1.as_ref().unwrap().count_brain(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_dir() {
        let dir = std::env::temp_dir().join("flair-berry-no-such-dir-3b1f");
        assert!(matches!(scan_loader(&dir), Err(BrainError::Io(_))));
    }
}
