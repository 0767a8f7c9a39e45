//! 二维平面结构元.

use itertools::iproduct;
use ndarray::Array2;

/// 二维平面结构元, 以相对中心的 `(dh, dw)` 偏移量集合表示.
///
/// 偏移量按行优先序存储, 且总是包含中心 `(0, 0)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructElem {
    radius: usize,
    offsets: Vec<(isize, isize)>,
}

impl StructElem {
    /// 半径为 `radius` 的圆盘: 满足 `dh^2 + dw^2 <= radius^2` 的所有偏移.
    ///
    /// 半径为 1 时即 4-邻域十字形.
    pub fn disk(radius: usize) -> Self {
        let r2 = (radius * radius) as isize;
        Self::from_predicate(radius, |dh, dw| dh * dh + dw * dw <= r2)
    }

    /// 放宽半径的圆盘: 满足 `dh^2 + dw^2 <= (radius + 0.5)^2` 的所有偏移.
    ///
    /// 外接正方形大小不变 (仍为 `2 * radius + 1`), 但边缘更饱满.
    /// 半径为 1 时即 3x3 正方形.
    pub fn disk_relaxed(radius: usize) -> Self {
        // 4 * (dh^2 + dw^2) <= (2r + 1)^2, 避免浮点比较.
        let d = (2 * radius + 1) as isize;
        Self::from_predicate(radius, |dh, dw| 4 * (dh * dh + dw * dw) <= d * d)
    }

    /// 收集外接正方形内满足 `pred` 的偏移.
    fn from_predicate(radius: usize, pred: impl Fn(isize, isize) -> bool) -> Self {
        let r = radius as isize;
        let offsets = iproduct!(-r..=r, -r..=r)
            .filter(|&(dh, dw)| pred(dh, dw))
            .collect();
        Self { radius, offsets }
    }

    /// 结构元半径.
    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// 相对中心的全部偏移量.
    #[inline]
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    /// 结构元中前景元素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// 结构元是否没有任何元素. 由构造方式保证总是返回 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// 以 `(2r + 1) x (2r + 1)` 的 0/1 矩阵形式展示结构元.
    pub fn to_array(&self) -> Array2<u8> {
        let side = 2 * self.radius + 1;
        let r = self.radius as isize;
        let mut ans = Array2::zeros((side, side));
        for &(dh, dw) in self.offsets.iter() {
            ans[((dh + r) as usize, (dw + r) as usize)] = 1;
        }
        ans
    }
}
