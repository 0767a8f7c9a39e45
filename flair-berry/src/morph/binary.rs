//! 二维水平切片上的二值形态学操作.

use super::StructElem;
use crate::consts::gray::*;
use crate::{Idx2d, MaskSliceMut};

/// 计算 `(h, w) + (dh, dw)`. 结果为负时返回 `None`, 但不检查上界.
#[inline]
fn shifted((h, w): Idx2d, (dh, dw): (isize, isize)) -> Option<Idx2d> {
    Some((h.checked_add_signed(dh)?, w.checked_add_signed(dw)?))
}

/// 二值形态学实现块.
impl<'a> MaskSliceMut<'a> {
    /// 以结构元 `se` 对切片进行二值腐蚀. 返回被腐蚀掉的脑组织像素个数.
    ///
    /// 一个脑组织像素被保留, 当且仅当以其为中心放置 `se` 后,
    /// 覆盖到的所有像素都是脑组织. 图像范围以外的位置视为脑组织,
    /// 因此图像边缘本身不会造成腐蚀.
    pub fn erode(&mut self, se: &StructElem) -> usize {
        let src = self.to_array();
        let mut eroded = 0usize;
        for (pos, &pix) in src.indexed_iter() {
            if !is_brain(pix) {
                continue;
            }
            let hit_background = se.offsets().iter().any(|&d| {
                shifted(pos, d)
                    .and_then(|p| src.get(p))
                    .is_some_and(|&v| is_background(v))
            });
            if hit_background {
                self[pos] = MASK_BACKGROUND;
                eroded += 1;
            }
        }
        eroded
    }

    /// 以结构元 `se` 对切片进行二值膨胀. 返回新增的脑组织像素个数.
    ///
    /// 每个脑组织像素都会把 `se` 覆盖到的所有 (图像范围内的) 像素置为脑组织.
    pub fn dilate(&mut self, se: &StructElem) -> usize {
        let src = self.to_array();
        let mut grown = 0usize;
        for (pos, _) in src.indexed_iter().filter(|(_, p)| is_brain(**p)) {
            for &d in se.offsets() {
                let Some(target) = shifted(pos, d) else {
                    continue;
                };
                if let Some(pix) = self.get_mut(target) {
                    if is_background(*pix) {
                        *pix = MASK_BRAIN;
                        grown += 1;
                    }
                }
            }
        }
        grown
    }

    /// 孔洞填充: 将所有不接触图像边缘的 4-连通背景区域填充为脑组织.
    ///
    /// 如果以此法修改了原图则返回 `true`, 否则返回 `false`.
    pub fn fill_holes(&mut self) -> bool {
        let mut non_trivial = false;
        for area in self.background_areas() {
            if self.all_within(&area) {
                self.fill_batch(area, MASK_BRAIN);
                non_trivial = true;
            }
        }
        non_trivial
    }
}
