#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 3D FLAIR MRI 扫描的脑提取 (skull-stripping) 与脑掩膜验证算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据在内存中均按 `(z, h, w)` 组织, `z` 为轴向水平切片索引.
//!   读写文件时的轴变换由 `dataset` 模块负责.
//! 2. 脑掩膜只含 0 (背景) 与 1 (脑组织) 两种值. 以 0/255 存储的掩膜在读入时被规范化.
//! 3. 在非期望情况下 (例如索引越界), 程序会直接 panic, 而不会导致内存错误.
//!
//! # 开发计划
//!
//! ### 强度窗口阈值分割 ✅
//!
//! 闭区间 `[lower, upper]` 内的非零强度被视为候选脑组织.
//!
//! 实现位于 `flair-berry/src/data/window.rs`.
//!
//! ### 二维形态学与三维连通域 ✅
//!
//! 1. 欧氏圆盘结构元 (严格半径与放宽半径两种). ✅
//! 2. 水平切片上的二值腐蚀、膨胀、孔洞填充. ✅
//! 3. 6/18/26-邻接的三维连通域标记, 最大前景区域选取. ✅
//!
//! 实现位于 `flair-berry/src/morph`.
//!
//! ### 脑掩膜精化 ✅
//!
//! 腐蚀 -> 最大连通域 -> 膨胀 -> 孔洞填充. 切片间操作可借助 `rayon` 并行.
//!
//! 实现位于 `flair-berry/src/post_proc/refine.rs`.
//!
//! ### 脑掩膜验证 ✅
//!
//! Dice, Jaccard, 各类别 precision/recall/F-score/support, 准确率, 混淆矩阵,
//! 以及批量结果的平均.
//!
//! 实现位于 `flair-berry/src/post_proc/validate.rs`.
//!
//! ### 数据读写 ✅
//!
//! mat (含 zlib 压缩), nifti, npz, npy 四种容器. 掩膜可按 0/1 或 0/255 写出.
//! 迭代器风格的目录加载器.
//!
//! 实现位于 `flair-berry/src/dataset`.
//!
//! ### 小功能 ✅
//!
//! 1. 将水平切片保存为 PNG 预览图. ✅
//! 2. 精化各阶段统计信息. ✅
//!
//! ### 完善代码文档 ⌛️
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// 3D 体数据基础数据结构.
mod data;

pub use data::{
    BrainMask, FlairScan, ImgWriteVis, IntensityWindow, MaskSlice, MaskSliceMut, VolumeAttr,
};

pub mod consts;

mod error;

pub use error::{BrainError, BrainResult};

pub mod morph;

pub mod post_proc;

pub mod dataset;
pub mod prelude;
