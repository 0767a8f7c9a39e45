//! 运行时错误.

use crate::Idx3d;
use std::fmt;
use std::path::PathBuf;

/// 脑提取、验证及其数据读写过程中的运行时错误.
#[derive(Debug)]
pub enum BrainError {
    /// 两个体数据形状不一致. 第一个参数为期望形状, 第二个参数为实际形状.
    ShapeMismatch {
        /// 期望的 `(z, h, w)` 形状.
        expected: Idx3d,
        /// 实际的 `(z, h, w)` 形状.
        found: Idx3d,
    },

    /// 连通域分析找不到任何前景区域 (腐蚀后已无脑组织残留).
    EmptySegmentation,

    /// 体数据在某个维度上长度为零.
    EmptyVolume,

    /// 掩膜中出现了 0, 1 以外的体素值.
    NonBinary {
        /// 第一个被发现的非法值.
        value: u8,
    },

    /// 数据文件中不存在所需字段.
    MissingField(String),

    /// 无法根据扩展名识别的文件格式.
    UnsupportedFormat(PathBuf),

    /// mat 文件结构损坏或含有不支持的内容.
    Mat(String),

    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// 读写 nifti 文件错误.
    Nifti(nifti::NiftiError),

    /// 读取 npz 文件错误.
    ReadNpz(ndarray_npy::ReadNpzError),

    /// 写入 npz 文件错误.
    WriteNpz(ndarray_npy::WriteNpzError),

    /// 读取 npy 文件错误.
    ReadNpy(ndarray_npy::ReadNpyError),

    /// 写入 npy 文件错误.
    WriteNpy(ndarray_npy::WriteNpyError),

    /// 保存预览图像错误.
    Image(image::ImageError),
}

impl fmt::Display for BrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrainError::ShapeMismatch { expected, found } => {
                write!(f, "体数据形状不一致: 期望 {expected:?}, 实际 {found:?}")
            }
            BrainError::EmptySegmentation => write!(f, "连通域分析未找到任何前景区域"),
            BrainError::EmptyVolume => write!(f, "体数据为空"),
            BrainError::NonBinary { value } => write!(f, "掩膜中存在非二值体素 `{value}`"),
            BrainError::MissingField(name) => write!(f, "数据文件中不存在字段 `{name}`"),
            BrainError::UnsupportedFormat(p) => write!(f, "不支持的文件格式: {}", p.display()),
            BrainError::Mat(msg) => write!(f, "mat 文件错误: {msg}"),
            BrainError::Io(e) => write!(f, "I/O 错误: {e}"),
            BrainError::Nifti(e) => write!(f, "nifti 错误: {e}"),
            BrainError::ReadNpz(e) => write!(f, "npz 读取错误: {e}"),
            BrainError::WriteNpz(e) => write!(f, "npz 写入错误: {e}"),
            BrainError::ReadNpy(e) => write!(f, "npy 读取错误: {e}"),
            BrainError::WriteNpy(e) => write!(f, "npy 写入错误: {e}"),
            BrainError::Image(e) => write!(f, "图像保存错误: {e}"),
        }
    }
}

impl std::error::Error for BrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrainError::Io(e) => Some(e),
            BrainError::Nifti(e) => Some(e),
            BrainError::ReadNpz(e) => Some(e),
            BrainError::WriteNpz(e) => Some(e),
            BrainError::ReadNpy(e) => Some(e),
            BrainError::WriteNpy(e) => Some(e),
            BrainError::Image(e) => Some(e),
            _ => None,
        }
    }
}

macro_rules! impl_from_error {
    ($($source: ty => $variant: ident),+ $(,)?) => {
        $(
            impl From<$source> for BrainError {
                #[inline]
                fn from(e: $source) -> Self {
                    BrainError::$variant(e)
                }
            }
        )+
    };
}

impl_from_error!(
    std::io::Error => Io,
    nifti::NiftiError => Nifti,
    ndarray_npy::ReadNpzError => ReadNpz,
    ndarray_npy::WriteNpzError => WriteNpz,
    ndarray_npy::ReadNpyError => ReadNpy,
    ndarray_npy::WriteNpyError => WriteNpy,
    image::ImageError => Image,
);

/// 脑提取运行时结果.
pub type BrainResult<T> = Result<T, BrainError>;

impl BrainError {
    /// 若 `expected != found` 则返回形状不一致错误.
    #[inline]
    pub(crate) fn check_shape(expected: Idx3d, found: Idx3d) -> BrainResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(BrainError::ShapeMismatch { expected, found })
        }
    }
}
