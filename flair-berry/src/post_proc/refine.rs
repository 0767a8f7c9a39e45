//! 3D 阈值脑掩膜的形态学精化 (后处理).

use crate::error::{BrainError, BrainResult};
use crate::morph::{largest_region, Connectivity, LabelMap, StructElem};
use crate::{BrainMask, MaskSliceMut, VolumeAttr};
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 对阈值分割得到的原始脑掩膜实施形态学精化, 得到单一连通的脑区域.
///
/// 算法流程依次为:
///
/// 1. 以 `eroder` 对每个水平切片独立地进行二值腐蚀,
///   切断细小连接并去除小噪声岛.
/// 2. 在整个三维体上进行 26-邻接连通域标记, 只保留体素数最多的前景区域
///   (背景不参与比较; 并列时取标号最小者).
/// 3. 以 `dilater` 对每个水平切片独立地进行二值膨胀, 恢复被腐蚀的边界,
///   然后填充切片内部孔洞.
///
/// 该函数不修改 `mask`.
///
/// # 错误
///
/// - 若 `mask` 不含任何体素, 返回 [`BrainError::EmptyVolume`];
/// - 若腐蚀后不存在任何脑组织, 返回 [`BrainError::EmptySegmentation`].
pub fn refine_mask(
    mask: &BrainMask,
    eroder: &StructElem,
    dilater: &StructElem,
) -> BrainResult<BrainMask> {
    MaskRefiner::new(eroder, dilater).refine(mask)
}

/// 同 `refine_mask`, 但同时返回各阶段的统计信息.
pub fn refine_mask_with_stats(
    mask: &BrainMask,
    eroder: &StructElem,
    dilater: &StructElem,
) -> BrainResult<Refined> {
    MaskRefiner::new(eroder, dilater).refine_with_stats(mask)
}

/// 精化各阶段的统计信息.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefineStats {
    /// 输入掩膜中的脑组织体素个数.
    pub input: usize,

    /// 腐蚀阶段去除的体素个数.
    pub eroded: usize,

    /// 腐蚀后的前景连通域个数.
    pub regions: usize,

    /// 被保留的最大连通域的体素个数.
    pub kept: usize,

    /// 膨胀阶段新增的体素个数.
    pub dilated: usize,

    /// 存在孔洞并被填充的切片个数.
    pub filled_slices: usize,

    /// 输出掩膜中的脑组织体素个数.
    pub output: usize,
}

impl RefineStats {
    /// 被丢弃的非最大连通域体素个数.
    #[inline]
    pub fn discarded(&self) -> usize {
        self.input - self.eroded - self.kept
    }
}

/// 精化后的掩膜及其统计信息.
#[derive(Clone, Debug)]
pub struct Refined {
    /// 精化后的掩膜.
    pub mask: BrainMask,

    /// 各阶段统计.
    pub stats: RefineStats,
}

/// 脑掩膜精化器. 持有两个结构元与连通域规则, 可对多个体数据重复使用.
#[derive(Clone, Debug)]
pub struct MaskRefiner<'a> {
    eroder: &'a StructElem,
    dilater: &'a StructElem,
    connectivity: Connectivity,
}

impl<'a> MaskRefiner<'a> {
    /// 以默认 (26-邻接) 连通规则初始化.
    #[inline]
    pub fn new(eroder: &'a StructElem, dilater: &'a StructElem) -> Self {
        Self {
            eroder,
            dilater,
            connectivity: Connectivity::default(),
        }
    }

    /// 指定连通域标记的邻接规则.
    #[inline]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// 运行精化, 只返回结果掩膜.
    #[inline]
    pub fn refine(&self, mask: &BrainMask) -> BrainResult<BrainMask> {
        Ok(self.refine_with_stats(mask)?.mask)
    }

    /// 运行精化, 并返回各阶段统计.
    pub fn refine_with_stats(&self, mask: &BrainMask) -> BrainResult<Refined> {
        if mask.is_empty() {
            return Err(BrainError::EmptyVolume);
        }
        let mut stats = RefineStats {
            input: mask.count_brain(),
            ..Default::default()
        };

        // step 1: 在独立副本上逐切片腐蚀.
        let mut eroded = mask.clone();
        stats.eroded = sum_over_slices(&mut eroded, |mut s| s.erode(self.eroder));
        debug!("erosion removed {} voxels", stats.eroded);

        // step 2: 全体积连通域分析, 保留最大前景区域.
        let labels = LabelMap::from_mask(eroded.data(), self.connectivity);
        debug_assert!(labels.is_consistent_with(eroded.data()));
        let sizes = labels.region_sizes();
        let id = largest_region(&sizes).ok_or(BrainError::EmptySegmentation)?;
        stats.regions = labels.region_len();
        stats.kept = sizes[id as usize];
        debug!(
            "kept region #{id} ({} voxels) out of {} regions",
            stats.kept, stats.regions
        );

        // step 3: 逐切片膨胀并填充孔洞.
        let mut brain = mask.sibling(labels.extract(id));
        stats.dilated = sum_over_slices(&mut brain, |mut s| s.dilate(self.dilater));
        stats.filled_slices = sum_over_slices(&mut brain, |mut s| usize::from(s.fill_holes()));
        stats.output = brain.count_brain();
        debug!(
            "dilation added {} voxels, holes filled on {} slices",
            stats.dilated, stats.filled_slices
        );

        Ok(Refined { mask: brain, stats })
    }
}

/// 对每个水平切片实施 `op`, 并对返回值求和. 开启 `rayon` 时切片间并行执行.
fn sum_over_slices<F>(mask: &mut BrainMask, op: F) -> usize
where
    F: Fn(MaskSliceMut) -> usize + Sync + Send,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            mask.par_sum_slice_mut(op)
        } else {
            mask.slice_iter_mut().map(op).sum()
        }
    }
}
