//! 通用常量.

/// 单通道颜色.
pub mod gray {
    /// 脑掩膜中, 背景的体素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 脑掩膜中, 脑组织的体素值.
    pub const MASK_BRAIN: u8 = 1;

    /// 以 ubyte 惯例 (0/255) 存储的掩膜文件中, 脑组织的体素值.
    /// 读入时会被规范化为 [`MASK_BRAIN`].
    pub const UBYTE_BRAIN: u8 = 255;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }

    /// 像素是否是脑组织?
    #[inline]
    pub const fn is_brain(p: u8) -> bool {
        matches!(p, MASK_BRAIN)
    }

    /// 像素是否是合法的二值掩膜值?
    #[inline]
    pub const fn is_binary(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND | MASK_BRAIN)
    }
}

/// 数据文件中的字段名.
pub mod field {
    /// 存放 FLAIR 强度体数据的字段.
    pub const SCAN: &str = "im";

    /// mat 文件中 [`SCAN`] 为结构体时, 存放强度体数据的成员.
    pub const SCAN_MEMBER: &str = "final";

    /// 存放自动脑掩膜的字段.
    pub const MASK: &str = "brainMask";

    /// 存放真值脑掩膜的字段.
    pub const TRUTH: &str = "gt";
}

/// 默认强度窗口下限 (含).
pub const DEFAULT_LOWER_BOUND: f32 = 200.0;

/// 默认强度窗口上限 (含).
pub const DEFAULT_UPPER_BOUND: f32 = 400.0;

/// 默认腐蚀结构元半径.
pub const DEFAULT_ERODE_RADIUS: usize = 4;

/// 默认膨胀结构元半径.
pub const DEFAULT_DILATE_RADIUS: usize = 6;

/// 体素/像素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    /// `MASK_BACKGROUND`, 代表背景.
    Background,

    /// `MASK_BRAIN`, 代表前景.
    Foreground,
}

impl ElemType {
    /// 对应的掩膜体素值.
    #[inline]
    pub fn to_mask_value(self) -> u8 {
        match self {
            Self::Background => gray::MASK_BACKGROUND,
            Self::Foreground => gray::MASK_BRAIN,
        }
    }
}
