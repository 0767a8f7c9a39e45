use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};
use nifti::NiftiHeader;

use crate::consts::gray::*;
use crate::error::{BrainError, BrainResult};
use crate::Idx3d;

pub mod slice;
pub mod window;

pub use slice::{ImgWriteVis, MaskSlice, MaskSliceMut};

pub use window::IntensityWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
pub(crate) type BoxedHeader = Box<NiftiHeader>;

/// 3D 体数据的共用属性和部分通用操作.
///
/// 所有体数据均按 `(z, h, w)` 组织, 其中 `z` 为轴向 (axial) 水平切片索引.
pub trait VolumeAttr {
    /// 获取底层数组的形状.
    fn raw_shape(&self) -> &[usize];

    /// 获取体数据来源文件的 nifti header (若有).
    fn header(&self) -> Option<&NiftiHeader>;

    /// 获取数据形状大小 `(z, h, w)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        let &[z, h, w] = self.raw_shape() else {
            unreachable!()
        };
        (z, h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 体数据是否不含任何体素?
    #[inline]
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 获取单个体素分辨率 (毫米), 顺序为 `[z, h, w]`.
    /// 仅当体数据来自 nifti 文件时可用.
    #[inline]
    fn pix_dim(&self) -> Option<[f64; 3]> {
        let [_, w, h, z, ..] = self.header()?.pixdim;
        Some([z as f64, h as f64, w as f64])
    }

    /// 获取体素的实际体积值, 以立方毫米为单位. 仅当体数据来自 nifti 文件时可用.
    #[inline]
    fn voxel(&self) -> Option<f64> {
        Some(self.pix_dim()?.iter().product())
    }
}

/// 3D FLAIR MRI 扫描. 强度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct FlairScan {
    pub(crate) header: Option<BoxedHeader>,
    pub(crate) data: Array3<f32>,
}

impl VolumeAttr for FlairScan {
    #[inline]
    fn raw_shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[inline]
    fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }
}

impl Index<Idx3d> for FlairScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl FlairScan {
    /// 由 `(z, h, w)` 组织的强度数组直接创建扫描.
    #[inline]
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { header: None, data }
    }

    /// 以强度窗口 `window` 对扫描进行阈值分割, 得到原始 (未精化) 脑掩膜.
    ///
    /// 生成的掩膜继承扫描的 header.
    pub fn threshold(&self, window: &IntensityWindow) -> BrainMask {
        BrainMask {
            header: self.header.clone(),
            data: self.data.mapv(|v| window.eval(v).to_mask_value()),
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }
}

/// 3D 二值脑掩膜. 体素值以 `u8` 保存, 且只能为 `MASK_BACKGROUND` 或 `MASK_BRAIN`.
#[derive(Debug, Clone)]
pub struct BrainMask {
    pub(crate) header: Option<BoxedHeader>,
    pub(crate) data: Array3<u8>,
}

impl VolumeAttr for BrainMask {
    #[inline]
    fn raw_shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[inline]
    fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }
}

impl Index<Idx3d> for BrainMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for BrainMask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl BrainMask {
    /// 由 `(z, h, w)` 组织的裸数据创建掩膜.
    ///
    /// 如果 `data` 存在 0, 1 以外的值则返回 `Err`.
    pub fn from_array(data: Array3<u8>) -> BrainResult<Self> {
        let mask = Self { header: None, data };
        match mask.first_non_binary() {
            Some(value) => Err(BrainError::NonBinary { value }),
            None => Ok(mask),
        }
    }

    /// 创建形状为 `shape` 的全背景掩膜.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self {
            header: None,
            data: Array3::zeros(shape),
        }
    }

    /// 创建与 `self` 形状相同且共享 header 的新掩膜, 数据由 `data` 给出.
    ///
    /// 调用者负责保证 `data` 为二值且形状一致.
    #[inline]
    pub(crate) fn sibling(&self, data: Array3<u8>) -> Self {
        debug_assert_eq!(self.data.shape(), data.shape());
        Self {
            header: self.header.clone(),
            data,
        }
    }

    /// 获取 3D 掩膜 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> MaskSlice {
        MaskSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取 3D 掩膜 z 空间的第 `z_index` 层可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> MaskSliceMut {
        MaskSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 掩膜水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = MaskSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(MaskSliceMut::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    ///
    /// 写入 0, 1 以外的值会使后续的验证返回 [`BrainError::NonBinary`].
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取脑组织体素个数.
    #[inline]
    pub fn count_brain(&self) -> usize {
        self.data.iter().filter(|p| is_brain(**p)).count()
    }

    /// 按行优先序查找第一个非二值体素的值. 掩膜合法时返回 `None`.
    #[inline]
    pub fn first_non_binary(&self) -> Option<u8> {
        self.data.iter().copied().find(|p| !is_binary(*p))
    }

    /// 获取脑组织的实际体积, 以毫升为单位. 仅当掩膜带有 nifti header 时可用.
    #[inline]
    pub fn brain_volume_ml(&self) -> Option<f64> {
        Some(self.voxel()? * self.count_brain() as f64 / 1000.0)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl BrainMask {
    /// 借助 `rayon`, 并行地对 3D 掩膜每个水平可变切片实施 `op` 操作.
    pub fn par_for_each_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(MaskSliceMut) + Sync + Send,
    {
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(MaskSliceMut::new(v));
            });
    }

    /// 借助 `rayon`, 并行地对每个水平可变切片实施 `op` 操作, 并对返回值求和.
    pub fn par_sum_slice_mut<F>(&mut self, op: F) -> usize
    where
        F: Fn(MaskSliceMut) -> usize + Sync + Send,
    {
        let cnt = AtomicUsize::new(0);
        self.par_for_each_slice_mut(|s| {
            cnt.fetch_add(op(s), Ordering::Release);
        });
        cnt.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_mask_rejects_non_binary() {
        let mut data = Array3::<u8>::zeros((2, 3, 3));
        data[(1, 1, 1)] = 2;
        match BrainMask::from_array(data) {
            Err(BrainError::NonBinary { value }) => assert_eq!(value, 2),
            other => panic!("期望 NonBinary 错误, 实际为 {other:?}"),
        }
    }

    #[test]
    fn test_threshold_closed_window() {
        let mut data = Array3::<f32>::zeros((1, 1, 5));
        for (i, v) in [199.9, 200.0, 300.0, 400.0, 400.1].into_iter().enumerate() {
            data[(0, 0, i)] = v;
        }
        let scan = FlairScan::from_array(data);
        let mask = scan.threshold(&IntensityWindow::from_flair_default());
        let got: Vec<u8> = mask.data().iter().copied().collect();
        assert_eq!(got, vec![0, 1, 1, 1, 0]);
        assert_eq!(mask.count_brain(), 3);
        assert_eq!(mask.shape(), scan.shape());
    }

    #[test]
    fn test_slice_at_follows_z() {
        let mut mask = BrainMask::zeros((3, 4, 4));
        mask[(2, 0, 0)] = MASK_BRAIN;
        let counts: Vec<usize> = (0..mask.len_z())
            .map(|z| mask.slice_at(z).count(MASK_BRAIN))
            .collect();
        assert_eq!(counts, vec![0, 0, 1]);
        assert!(mask.brain_volume_ml().is_none());
    }
}
