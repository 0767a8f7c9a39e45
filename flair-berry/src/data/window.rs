use crate::consts::{ElemType, DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND};

/// FLAIR 强度窗口, 即闭区间 \[lower, upper\].
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f32,
    upper: f32,
}

impl IntensityWindow {
    /// 构建强度窗口.
    ///
    /// `lower` 和 `upper` 必须是有限值, 且 `lower <= upper`, 否则返回 `None`.
    pub fn new(lower: f32, upper: f32) -> Option<IntensityWindow> {
        if lower.is_finite() && upper.is_finite() && lower <= upper {
            Some(Self { lower, upper })
        } else {
            None
        }
    }

    /// 构建一个适用于 FLAIR 脑组织的默认窗口, 即 \[200, 400\].
    #[inline]
    pub const fn from_flair_default() -> IntensityWindow {
        Self {
            lower: DEFAULT_LOWER_BOUND,
            upper: DEFAULT_UPPER_BOUND,
        }
    }

    /// 窗下限 (含).
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.lower
    }

    /// 窗上限 (含).
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.upper
    }

    /// 判断强度值 `v` 是否落在窗口内.
    #[inline]
    pub fn contains(&self, v: f32) -> bool {
        (self.lower..=self.upper).contains(&v)
    }

    /// 求强度值 `v` 被阈值分割后的体素类型.
    ///
    /// 落在窗口内的非零强度为前景; 零强度、窗口外的值以及 NaN 均为背景.
    #[inline]
    pub fn eval(&self, v: f32) -> ElemType {
        if v != 0.0 && self.contains(v) {
            ElemType::Foreground
        } else {
            ElemType::Background
        }
    }
}

impl Default for IntensityWindow {
    #[inline]
    fn default() -> Self {
        Self::from_flair_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::ElemType;
    use crate::IntensityWindow;

    fn is_valid_init(lower: f32, upper: f32) -> bool {
        IntensityWindow::new(lower, upper).is_some()
    }

    #[test]
    fn test_window_invalid_input() {
        assert!(!is_valid_init(1.0, 0.0));
        assert!(!is_valid_init(f32::NAN, 1.0));
        assert!(!is_valid_init(0.0, f32::INFINITY));
        assert!(is_valid_init(5.0, 5.0));
    }

    #[test]
    fn test_window_generic() {
        let w = IntensityWindow::from_flair_default();
        assert_eq!(w.eval(f32::NAN), ElemType::Background);
        assert_eq!(w.eval(199.99), ElemType::Background);

        // 闭区间两端
        assert_eq!(w.eval(200.0), ElemType::Foreground);
        assert_eq!(w.eval(400.0), ElemType::Foreground);

        assert_eq!(w.eval(300.0), ElemType::Foreground);
        assert_eq!(w.eval(400.01), ElemType::Background);
    }

    #[test]
    fn test_window_zero_is_background() {
        let w = IntensityWindow::new(-10.0, 10.0).unwrap();
        assert_eq!(w.eval(0.0), ElemType::Background);
        assert_eq!(w.eval(-5.0), ElemType::Foreground);
    }
}
