//! 体数据文件的读取与写入.
//!
//! 支持四种容器:
//!
//! 1. nifti (`.nii`, `.nii.gz`). 原始 `[W, H, z]` 数据被转换为 `[z, H, W]`.
//! 2. numpy 归档 (`.npz`). 数据以字段名索引, 原始 `[X, Y, z]` 数据被转换为 `[z, X, Y]`.
//! 3. numpy 数组 (`.npy`). 布局同 `.npz`, 但只有一个匿名数组, 字段名被忽略.
//! 4. MATLAB (`.mat`). 数据以变量名索引, 布局同 `.npz`.

use crate::consts::field;
use crate::consts::gray::*;
use crate::data::BoxedHeader;
use crate::dataset::mat;
use crate::error::{BrainError, BrainResult};
use crate::{BrainMask, FlairScan};
use ndarray::{Array3, ArrayD, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyError, ReadNpzError, ReadableElement};
use nifti::writer::WriterOptions;
use nifti::{InMemNiftiVolume, IntoNdArray, NiftiObject, ReaderOptions};
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// 体数据文件的容器格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// `.nii` 或 `.nii.gz`.
    Nifti,

    /// `.npz`.
    Npz,

    /// `.npy`.
    Npy,

    /// `.mat`.
    Mat,
}

impl VolumeFormat {
    /// 根据文件名后缀 (大小写不敏感) 判断容器格式.
    pub fn from_path<P: AsRef<Path>>(path: P) -> BrainResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(VolumeFormat::Nifti)
        } else if name.ends_with(".npz") {
            Ok(VolumeFormat::Npz)
        } else if name.ends_with(".npy") {
            Ok(VolumeFormat::Npy)
        } else if name.ends_with(".mat") {
            Ok(VolumeFormat::Mat)
        } else {
            Err(BrainError::UnsupportedFormat(path.to_owned()))
        }
    }
}

/// 依次尝试以 `f32` 和给定的其它元素类型读取三维数组, 成功后统一转换为 `f32`.
///
/// 全部失败时返回以 `f32` 读取时的错误.
macro_rules! read_as_f32 {
    ($read: ident ($arg: expr) or $($t: ty),+) => {{
        let first = match $read::<f32>($arg) {
            Ok(data) => return Ok(data),
            Err(e) => e,
        };
        $(
            if let Ok(data) = $read::<$t>($arg) {
                return Ok(data.mapv(|v| v as f32));
            }
        )+
        Err(first.into())
    }};
}

/// 在 npz 归档中查找字段 `name` 对应的条目名. 条目名可带或不带 `.npy` 后缀.
fn npz_entry_name<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> BrainResult<String> {
    npz.names()?
        .into_iter()
        .find(|n| n.trim_end_matches(".npy") == name)
        .ok_or_else(|| BrainError::MissingField(name.to_owned()))
}

#[inline]
fn npz_array<T: ReadableElement>(
    (npz, entry): (&mut NpzReader<File>, &str),
) -> Result<Array3<T>, ReadNpzError> {
    npz.by_name::<OwnedRepr<T>, Ix3>(entry)
}

#[inline]
fn npy_array<T: ReadableElement>(path: &Path) -> Result<Array3<T>, ReadNpyError> {
    ndarray_npy::read_npy(path)
}

/// numpy `[X, Y, z]` -> `[z, X, Y]`.
#[inline]
fn from_numpy_layout<T: Clone>(data: Array3<T>) -> Array3<T> {
    data.permuted_axes([2, 0, 1]).as_standard_layout().into_owned()
}

/// `[z, X, Y]` -> numpy `[X, Y, z]`.
#[inline]
fn to_numpy_layout<T: Clone>(data: &Array3<T>) -> Array3<T> {
    data.view()
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned()
}

/// 读取 nifti 文件, 返回 header 和尚未转换的体数据.
fn read_nifti(path: &Path) -> BrainResult<(BoxedHeader, InMemNiftiVolume)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    Ok((header, obj.into_volume()))
}

/// nifti `[W, H, z]` -> `[z, H, W]`. 非三维数据返回 [`BrainError::UnsupportedFormat`].
///
/// hint: 原第一维向右增长, 原第二维向下增长.
fn from_nifti_layout<T: Clone>(data: ArrayD<T>, path: &Path) -> BrainResult<Array3<T>> {
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| BrainError::UnsupportedFormat(path.to_owned()))?;
    Ok(data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
}

/// 将掩膜值规范化到 `{0, 1}`: 以 0/255 惯例存储的脑组织被改写为 [`MASK_BRAIN`].
fn normalize_mask(data: Array3<u8>) -> BrainResult<BrainMask> {
    BrainMask::from_array(data.mapv_into(|v| if v == UBYTE_BRAIN { MASK_BRAIN } else { v }))
}

/// 将 mat 中以任意数值类型存储的掩膜转换为 `u8`. 非整数或越界的值返回 `Err`.
fn mat_mask_to_u8(data: Array3<f64>, name: &str) -> BrainResult<Array3<u8>> {
    if let Some(v) = data
        .iter()
        .find(|v| v.fract() != 0.0 || !(0.0..=255.0).contains(*v))
    {
        return Err(BrainError::Mat(format!("掩膜 `{name}` 中存在非法体素值 {v}")));
    }
    Ok(data.mapv(|v| v as u8))
}

/// 掩膜写入文件时脑组织体素的取值.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MaskEncoding {
    /// 脑组织写为 [`MASK_BRAIN`], 即 0/1.
    #[default]
    Binary,

    /// 脑组织写为 [`UBYTE_BRAIN`], 即 0/255.
    Ubyte,
}

impl FlairScan {
    /// 打开 FLAIR 扫描文件. 对于 npz/mat 文件, 数据位于字段 [`field::SCAN`].
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> BrainResult<Self> {
        Self::open_field(path, field::SCAN)
    }

    /// 打开 FLAIR 扫描文件. 对于 npz/mat 文件, 数据位于字段 `name`, 其余格式忽略该参数.
    /// mat 文件中若 `name` 是结构体, 则读取其成员 [`field::SCAN_MEMBER`].
    ///
    /// npz/npy 中以 `f32, f64, i16, u16, i32, u8` 存储的强度都被接受并转换为 `f32`.
    pub fn open_field<P: AsRef<Path>>(path: P, name: &str) -> BrainResult<Self> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path)? {
            VolumeFormat::Nifti => {
                let (header, volume) = read_nifti(path)?;
                Ok(Self {
                    header: Some(header),
                    data: from_nifti_layout(volume.into_ndarray::<f32>()?, path)?,
                })
            }
            VolumeFormat::Npz => {
                let mut npz = NpzReader::new(File::open(path)?)?;
                let entry = npz_entry_name(&mut npz, name)?;
                let data = read_npz_intensity(&mut npz, &entry)?;
                Ok(Self::from_array(from_numpy_layout(data)))
            }
            VolumeFormat::Npy => {
                let data = read_npy_intensity(path)?;
                Ok(Self::from_array(from_numpy_layout(data)))
            }
            VolumeFormat::Mat => {
                let data = mat::read_volume(path, name, Some(field::SCAN_MEMBER))?;
                Ok(Self::from_array(from_numpy_layout(data.mapv(|v| v as f32))))
            }
        }
    }
}

fn read_npz_intensity(npz: &mut NpzReader<File>, entry: &str) -> BrainResult<Array3<f32>> {
    read_as_f32!(npz_array((&mut *npz, entry)) or f64, i16, u16, i32, u8)
}

fn read_npy_intensity(path: &Path) -> BrainResult<Array3<f32>> {
    read_as_f32!(npy_array(path) or f64, i16, u16, i32, u8)
}

impl BrainMask {
    /// 打开脑掩膜文件. 对于 npz/mat 文件, 数据位于字段 `name`, 其余格式忽略该参数.
    ///
    /// # 注意
    ///
    /// 1. 以 0/255 惯例存储的掩膜会被规范化为 0/1.
    /// 2. 存在其它取值时返回 [`BrainError::NonBinary`].
    pub fn open<P: AsRef<Path>>(path: P, name: &str) -> BrainResult<Self> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path)? {
            VolumeFormat::Nifti => {
                let (header, volume) = read_nifti(path)?;
                let data = from_nifti_layout(volume.into_ndarray::<u8>()?, path)?;
                let mut mask = normalize_mask(data)?;
                mask.header = Some(header);
                Ok(mask)
            }
            VolumeFormat::Npz => {
                let mut npz = NpzReader::new(File::open(path)?)?;
                let entry = npz_entry_name(&mut npz, name)?;
                let data = match npz_array::<u8>((&mut npz, &entry)) {
                    Ok(data) => data,
                    Err(e) => match npz_array::<bool>((&mut npz, &entry)) {
                        Ok(data) => data.mapv(u8::from),
                        Err(_) => return Err(e.into()),
                    },
                };
                normalize_mask(from_numpy_layout(data))
            }
            VolumeFormat::Npy => {
                let data = match npy_array::<u8>(path) {
                    Ok(data) => data,
                    Err(e) => match npy_array::<bool>(path) {
                        Ok(data) => data.mapv(u8::from),
                        Err(_) => return Err(e.into()),
                    },
                };
                normalize_mask(from_numpy_layout(data))
            }
            VolumeFormat::Mat => {
                let data = mat_mask_to_u8(mat::read_volume(path, name, None)?, name)?;
                normalize_mask(from_numpy_layout(data))
            }
        }
    }

    /// 将掩膜以 `u8` 0/1 保存到 `path`, 容器格式由后缀决定.
    /// 对于 npz/mat 文件, 数据写入字段 `name`, 其余格式忽略该参数.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P, name: &str) -> BrainResult<()> {
        self.save_as(path, name, MaskEncoding::Binary)
    }

    /// 同 [`BrainMask::save`], 但脑组织体素按 `encoding` 取值.
    ///
    /// 写入 nifti 时, 若掩膜带有来源扫描的 header, 则以其为参考 header.
    pub fn save_as<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        encoding: MaskEncoding,
    ) -> BrainResult<()> {
        let path = path.as_ref();
        let data = match encoding {
            MaskEncoding::Binary => Cow::Borrowed(&self.data),
            MaskEncoding::Ubyte => Cow::Owned(
                self.data
                    .mapv(|v| if is_brain(v) { UBYTE_BRAIN } else { MASK_BACKGROUND }),
            ),
        };
        let data: &Array3<u8> = &data;
        match VolumeFormat::from_path(path)? {
            VolumeFormat::Nifti => {
                // [z, H, W] -> [W, H, z]
                let data = data
                    .view()
                    .permuted_axes([2, 1, 0])
                    .as_standard_layout()
                    .into_owned();
                let mut options = WriterOptions::new(path);
                if let Some(header) = self.header.as_deref() {
                    options = options.reference_header(header);
                }
                options.write_nifti(&data)?;
            }
            VolumeFormat::Npz => {
                let mut npz = NpzWriter::new(File::create(path)?);
                npz.add_array(format!("{name}.npy"), &to_numpy_layout(data))?;
                npz.finish()?;
            }
            VolumeFormat::Npy => {
                ndarray_npy::write_npy(path, &to_numpy_layout(data))?;
            }
            VolumeFormat::Mat => {
                mat::write_volume(path, name, to_numpy_layout(data).view())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VolumeAttr;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("flair-berry-io-{}-{name}", std::process::id()));
        p
    }

    fn sample_mask() -> BrainMask {
        let mut mask = BrainMask::zeros((3, 4, 5));
        mask[(0, 1, 2)] = MASK_BRAIN;
        mask[(2, 3, 4)] = MASK_BRAIN;
        mask[(1, 0, 0)] = MASK_BRAIN;
        mask
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(VolumeFormat::from_path("a/b.nii").unwrap(), VolumeFormat::Nifti);
        assert_eq!(VolumeFormat::from_path("b.NII.GZ").unwrap(), VolumeFormat::Nifti);
        assert_eq!(VolumeFormat::from_path("c.npz").unwrap(), VolumeFormat::Npz);
        assert_eq!(VolumeFormat::from_path("d.npy").unwrap(), VolumeFormat::Npy);
        assert_eq!(VolumeFormat::from_path("e.MAT").unwrap(), VolumeFormat::Mat);
        assert!(matches!(
            VolumeFormat::from_path("f.txt"),
            Err(BrainError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_npz_mask_round_trip() {
        let path = temp_file("mask.npz");
        let mask = sample_mask();
        mask.save(&path, field::MASK).unwrap();

        let back = BrainMask::open(&path, field::MASK).unwrap();
        assert_eq!(back.data(), mask.data());
        assert!(matches!(
            BrainMask::open(&path, field::TRUTH),
            Err(BrainError::MissingField(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_npz_scan_integer_intensity() {
        // numpy 布局 [X, Y, z] = [2, 3, 4].
        let path = temp_file("scan.npz");
        let raw = Array3::<i16>::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as i16);
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("im.npy", &raw).unwrap();
        npz.finish().unwrap();

        let scan = FlairScan::open(&path).unwrap();
        assert_eq!(scan.shape(), (4, 2, 3));
        assert_eq!(scan[(3, 1, 2)], 123.0);
        assert!(scan.header().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_npy_ubyte_mask_normalized() {
        let path = temp_file("ubyte.npy");
        let mut raw = Array3::<u8>::zeros((2, 2, 2));
        raw[(0, 1, 1)] = UBYTE_BRAIN;
        ndarray_npy::write_npy(&path, &raw).unwrap();

        let mask = BrainMask::open(&path, field::MASK).unwrap();
        assert_eq!(mask.count_brain(), 1);
        assert_eq!(mask[(1, 0, 1)], MASK_BRAIN);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_npy_non_binary_rejected() {
        let path = temp_file("bad.npy");
        let mut raw = Array3::<u8>::zeros((2, 2, 2));
        raw[(1, 1, 1)] = 3;
        ndarray_npy::write_npy(&path, &raw).unwrap();

        assert!(matches!(
            BrainMask::open(&path, field::MASK),
            Err(BrainError::NonBinary { value: 3 })
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_nifti_mask_round_trip() {
        let path = temp_file("mask.nii");
        let mask = sample_mask();
        mask.save(&path, field::MASK).unwrap();

        let back = BrainMask::open(&path, field::MASK).unwrap();
        assert_eq!(back.shape(), mask.shape());
        assert_eq!(back.data(), mask.data());
        assert!(back.header().is_some());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_npy_scan_float64_intensity() {
        let path = temp_file("scan.npy");
        let raw = Array3::<f64>::from_shape_fn((3, 2, 2), |(x, y, z)| {
            (x + 10 * y) as f64 + 0.5 * z as f64
        });
        ndarray_npy::write_npy(&path, &raw).unwrap();

        let scan = FlairScan::open(&path).unwrap();
        assert_eq!(scan.shape(), (2, 3, 2));
        assert_eq!(scan[(1, 2, 1)], 12.5);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_nifti_scan_layout() {
        // nifti 布局 [W, H, z] = [4, 3, 2].
        let path = temp_file("scan.nii");
        let raw =
            Array3::<f32>::from_shape_fn((4, 3, 2), |(w, h, z)| (w + 10 * h + 100 * z) as f32);
        WriterOptions::new(&path).write_nifti(&raw).unwrap();

        let scan = FlairScan::open(&path).unwrap();
        assert_eq!(scan.shape(), (2, 3, 4));
        assert_eq!(scan[(1, 2, 3)], 123.0);
        assert_eq!(scan.data()[(0, 1, 2)], 12.0);
        assert!(scan.header().is_some());

        let mask = scan.threshold(&crate::IntensityWindow::new(100.0, 200.0).unwrap());
        assert!(mask.header().is_some());
        assert_eq!(mask[(1, 0, 0)], MASK_BRAIN);
        assert_eq!(mask[(0, 2, 3)], MASK_BACKGROUND);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_mat_mask_ubyte_round_trip() {
        let path = temp_file("mask.mat");
        let mask = sample_mask();
        mask.save_as(&path, field::MASK, MaskEncoding::Ubyte).unwrap();

        // 文件中保存的是 0/255, 读入后规范化为 0/1.
        let raw = mat::read_volume(&path, field::MASK, None).unwrap();
        assert_eq!(raw[(0, 0, 1)], UBYTE_BRAIN as f64);
        assert_eq!(raw.iter().filter(|v| **v != 0.0).count(), 3);

        let back = BrainMask::open(&path, field::MASK).unwrap();
        assert_eq!(back.data(), mask.data());
        assert!(matches!(
            BrainMask::open(&path, field::TRUTH),
            Err(BrainError::MissingField(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_ubyte_encoding_npy() {
        let path = temp_file("ubyte-out.npy");
        sample_mask()
            .save_as(&path, field::MASK, MaskEncoding::Ubyte)
            .unwrap();
        let raw: Array3<u8> = ndarray_npy::read_npy(&path).unwrap();
        assert_eq!(raw.iter().filter(|v| **v == UBYTE_BRAIN).count(), 3);
        assert_eq!(BrainMask::open(&path, field::MASK).unwrap().count_brain(), 3);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = temp_file("missing.npz");
        assert!(matches!(FlairScan::open(&path), Err(BrainError::Io(_))));
    }
}
