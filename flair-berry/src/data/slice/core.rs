use crate::consts::gray::*;
use crate::{Area2d, Areas2d, Idx2d, Predicate};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}

/// 不可变、借用的二维水平脑掩膜切片.
pub struct MaskSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::BrainMask`].
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for MaskSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维水平脑掩膜切片.
pub struct MaskSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::BrainMask`].
    data: ArrayViewMut2<'a, u8>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut u8> {
        self.data.get_mut(pos)
    }

    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub(crate) fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self[pos] = new;
        }
    }
}

impl Index<Idx2d> for MaskSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for MaskSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// mask 不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 统计图像中值为 `label` 的像素总个数.
            #[inline]
            pub fn count(&self, label: u8) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 克隆底层数据, 获得一个拥有所有权的二维数组.
            #[inline]
            pub fn to_array(&self) -> Array2<u8> {
                self.data.to_owned()
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否位于图像的边缘.
            #[inline]
            pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
                h == 0
                    || h.saturating_add(1) == self.height()
                    || w == 0
                    || w.saturating_add(1) == self.width()
            }

            /// 判断 `positions` 的索引是否全部都在图像的内部.
            #[inline]
            pub fn all_within(&self, positions: &[Idx2d]) -> bool {
                positions.iter().all(|p| !self.is_at_border(*p))
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }

            /// 按照 4-相邻规则获取所有区域. 两个像素 `p1` 和 `p2` 属于同一个区域,
            /// 当且仅当存在一条从 `p1` 到 `p2` 的 4-相邻路径, 且路径上的所有像素
            /// (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
            ///
            /// 区域按其首个像素的行优先序排列.
            pub fn areas(&self, pred: Predicate) -> Areas2d {
                let mut ans = Areas2d::with_capacity(1);
                let mut visited = Array2::<bool>::default(self.shape());
                let mut bfs_q = VecDeque::with_capacity(16);

                for (pos, &pix) in self.data.indexed_iter() {
                    if visited[pos] || !pred(pix) {
                        continue;
                    }
                    visited[pos] = true;
                    bfs_q.push_back(pos);
                    let mut this_area = Area2d::with_capacity(1);
                    while let Some(cur) = bfs_q.pop_front() {
                        this_area.push(cur);
                        for next in neighbour4(cur) {
                            if matches!(self.get(next), Some(&v) if pred(v)) && !visited[next] {
                                visited[next] = true;
                                bfs_q.push_back(next);
                            }
                        }
                    }
                    ans.push(this_area);
                }
                ans
            }

            /// 按照 4-相邻原则获得图像中所有背景区域.
            #[inline]
            pub fn background_areas(&self) -> Areas2d {
                self.areas(is_background)
            }
        }
    };
}
impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, u8>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, u8>);

#[cfg(test)]
mod tests {
    use crate::consts::gray::*;
    use crate::BrainMask;

    #[test]
    fn test_areas_are_4_connected() {
        let mut mask = BrainMask::zeros((1, 4, 4));
        // 两个仅对角相邻的像素属于不同区域.
        mask[(0, 0, 0)] = MASK_BRAIN;
        mask[(0, 1, 1)] = MASK_BRAIN;
        mask[(0, 1, 2)] = MASK_BRAIN;

        let areas = mask.slice_at(0).areas(is_brain);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0], vec![(0, 0)]);
        assert_eq!(areas[1].len(), 2);

        // 背景整体 4-连通.
        assert_eq!(mask.slice_at(0).background_areas().len(), 1);
    }

    #[test]
    fn test_border_and_within() {
        let mask = BrainMask::zeros((1, 3, 3));
        let s = mask.slice_at(0);
        assert!(s.is_at_border((0, 1)));
        assert!(s.is_at_border((2, 2)));
        assert!(!s.is_at_border((1, 1)));
        assert!(s.all_within(&[(1, 1)]));
        assert!(!s.all_within(&[(1, 1), (1, 2)]));
    }
}
