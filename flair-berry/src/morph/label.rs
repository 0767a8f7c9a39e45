//! 三维连通域标记.

use crate::consts::gray::*;
use crate::Idx3d;
use itertools::iproduct;
use ndarray::{Array3, ArrayView3};
use std::collections::VecDeque;

/// 背景体素在 [`LabelMap`] 中的标号. 前景区域的标号总是从 1 开始.
pub const BACKGROUND_ID: u32 = 0;

/// 三维体素邻接规则.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Connectivity {
    /// 共面相邻, 即 6-邻域.
    Face,

    /// 共面或共棱相邻, 即 18-邻域.
    Edge,

    /// 共面、共棱或共顶点相邻, 即 26-邻域.
    #[default]
    Full,
}

impl Connectivity {
    /// 获取该规则下除自身以外的全部相对偏移.
    pub fn offsets(&self) -> Vec<(isize, isize, isize)> {
        // 偏移分量中非零值的个数上限.
        let max_nonzero = match self {
            Connectivity::Face => 1,
            Connectivity::Edge => 2,
            Connectivity::Full => 3,
        };
        iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
            .filter(|&(z, h, w)| {
                let nonzero = [z, h, w].iter().filter(|d| **d != 0).count();
                (1..=max_nonzero).contains(&nonzero)
            })
            .collect()
    }
}

/// 连通域标记结果.
///
/// 与源掩膜形状一致. 背景体素的标号恒为 [`BACKGROUND_ID`],
/// 每个连通的前景区域拥有唯一的正整数标号, 按区域首个体素的行优先序从 1 开始分配.
#[derive(Clone, Debug)]
pub struct LabelMap {
    data: Array3<u32>,
    regions: u32,
}

impl LabelMap {
    /// 按照 `connectivity` 规则标记 `mask` 中所有脑组织连通域.
    ///
    /// `mask` 中非 `MASK_BRAIN` 的体素均视为背景.
    pub fn from_mask(mask: ArrayView3<u8>, connectivity: Connectivity) -> Self {
        let offsets = connectivity.offsets();
        let mut data = Array3::<u32>::zeros(mask.raw_dim());
        let mut regions = BACKGROUND_ID;
        let mut bfs_q: VecDeque<Idx3d> = VecDeque::with_capacity(64);

        for (pos, &pix) in mask.indexed_iter() {
            if !is_brain(pix) || data[pos] != BACKGROUND_ID {
                continue;
            }
            regions += 1;
            data[pos] = regions;
            bfs_q.push_back(pos);

            while let Some((z, h, w)) = bfs_q.pop_front() {
                for &(dz, dh, dw) in offsets.iter() {
                    let (Some(nz), Some(nh), Some(nw)) = (
                        z.checked_add_signed(dz),
                        h.checked_add_signed(dh),
                        w.checked_add_signed(dw),
                    ) else {
                        continue;
                    };
                    let next = (nz, nh, nw);
                    if mask.get(next).is_some_and(|&p| is_brain(p)) && data[next] == BACKGROUND_ID
                    {
                        data[next] = regions;
                        bfs_q.push_back(next);
                    }
                }
            }
        }

        Self { data, regions }
    }

    /// 前景连通域个数 (不含背景).
    #[inline]
    pub fn region_len(&self) -> usize {
        self.regions as usize
    }

    /// 标号矩阵的形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得标号数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u32> {
        self.data.view()
    }

    /// 统计每个标号的体素个数. 返回值第 `i` 个分量为标号 `i` 的体素个数,
    /// 第 0 个分量为背景体素个数.
    pub fn region_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.region_len() + 1];
        for &id in self.data.iter() {
            sizes[id as usize] += 1;
        }
        sizes
    }

    /// 只保留标号为 `id` 的区域, 生成新的二值掩膜数据.
    pub fn extract(&self, id: u32) -> Array3<u8> {
        self.data.mapv(|v| {
            if v == id && id != BACKGROUND_ID {
                MASK_BRAIN
            } else {
                MASK_BACKGROUND
            }
        })
    }

    /// 检查标号与 `mask` 的背景约定是否一致:
    /// 形状相同, 且一个体素为背景当且仅当其标号为 [`BACKGROUND_ID`].
    pub fn is_consistent_with(&self, mask: ArrayView3<u8>) -> bool {
        self.data.raw_dim() == mask.raw_dim()
            && self
                .data
                .iter()
                .zip(mask.iter())
                .all(|(&id, &p)| (id == BACKGROUND_ID) == !is_brain(p))
    }
}

/// 在各标号的体素个数 `sizes` 中选出最大的前景区域标号.
///
/// `sizes[i]` 为标号 `i` 的体素个数; [`BACKGROUND_ID`] 不参与比较.
/// 存在多个最大区域时返回标号最小者. 如果没有任何非空前景区域, 返回 `None`.
pub fn largest_region(sizes: &[usize]) -> Option<u32> {
    let mut best: Option<(u32, usize)> = None;
    for (id, &size) in sizes.iter().enumerate() {
        let id = id as u32;
        if id == BACKGROUND_ID || size == 0 {
            continue;
        }
        if best.map_or(true, |(_, s)| size > s) {
            best = Some((id, size));
        }
    }
    best.map(|(id, _)| id)
}
