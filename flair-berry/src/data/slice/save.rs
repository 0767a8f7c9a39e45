//! 图像的持久化存储.

use crate::{MaskSlice, MaskSliceMut};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好"
/// 的方式保存, 而不是 "as is" 的方式. 对于 `MaskSlice`, `MaskSliceMut`
/// 这类仅存在 0, 1 像素值的图像, 在保存时会映射到黑白两色.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    match label {
        MASK_BACKGROUND => BLACK,
        MASK_BRAIN => WHITE,
        any_else => panic!("只允许图像存在 0, 1 像素, 但发现了 `{any_else}`"),
    }
}

macro_rules! impl_mask_save {
    ($($slice: ty),+) => {
        $(
            /// 会将背景/脑组织像素分别映射为黑色/白色. 不允许其他颜色.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

impl_mask_save!(MaskSlice<'_>, MaskSliceMut<'_>);

#[cfg(test)]
mod tests {
    use super::ImgWriteVis;
    use crate::consts::gray::*;
    use crate::BrainMask;

    #[test]
    fn test_save_preview_png() {
        let mut mask = BrainMask::zeros((1, 4, 6));
        mask[(0, 1, 2)] = MASK_BRAIN;
        let mut path = std::env::temp_dir();
        path.push(format!("flair-berry-preview-{}.png", std::process::id()));

        mask.slice_at(0).save(&path).unwrap();
        let img = image::open(&path).unwrap().into_luma8();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(img.dimensions(), (6, 4));
        assert_eq!(img.get_pixel(2, 1).0, [WHITE]);
        assert_eq!(img.get_pixel(0, 0).0, [BLACK]);
    }
}
