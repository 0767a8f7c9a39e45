//! MATLAB Level 5 (`.mat`, v5/v7) 文件的读写.
//!
//! 读取时支持数值数组与结构体, 顶层元素可以是 zlib 压缩的.
//! 写入时只输出一个 zlib 压缩的 `uint8` 变量.
//!
//! 数据按列优先存储, 即 `[X, Y, z]` 中 `X` 变化最快.

use crate::error::{BrainError, BrainResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array3, ArrayView3, ShapeBuilder};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

const HEADER_LEN: usize = 128;
const VERSION: u16 = 0x0100;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_STRUCT: u8 = 2;
const MX_DOUBLE: u8 = 6;
const MX_UINT8: u8 = 9;
const MX_UINT64: u8 = 15;

#[inline]
fn malformed<S: Into<String>>(msg: S) -> BrainError {
    BrainError::Mat(msg.into())
}

/// 解析后的 mat 变量.
#[derive(Debug)]
enum MatValue {
    /// 数值数组 (只保留实部), 数据按列优先存放.
    Numeric { dims: Vec<usize>, data: Vec<f64> },

    /// 结构体第一个元素的全部成员.
    Struct(Vec<(String, MatValue)>),

    /// 其它类别 (cell, char, sparse 等), 只记录类别号.
    Unsupported(u8),
}

/// 按文件字节序读取数据元素的游标.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Cursor<'a> {
    #[inline]
    fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> BrainResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| malformed("数据元素超出文件范围"))?;
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    #[inline]
    fn u32(&mut self) -> BrainResult<u32> {
        let b = self.take(4)?;
        Ok(word(b, self.big_endian))
    }

    /// 读取一个数据元素, 返回 `(类型, 内容)`.
    ///
    /// 矩阵内部的子元素需要 `padded`, 即内容之后补齐到 8 字节.
    fn element(&mut self, padded: bool) -> BrainResult<(u32, &'a [u8])> {
        let tag = self.u32()?;
        let small = (tag >> 16) as usize;
        if small != 0 {
            if small > 4 {
                return Err(malformed(format!("小数据元素长度 {small} 超过 4 字节")));
            }
            let data = self.take(4)?;
            return Ok((tag & 0xffff, &data[..small]));
        }
        let n = self.u32()? as usize;
        let data = self.take(n)?;
        if padded {
            self.pos = (self.pos + (8 - n % 8) % 8).min(self.buf.len());
        }
        Ok((tag, data))
    }
}

/// 以给定字节序解读 `b` 的前 4 个字节. 调用者保证 `b.len() >= 4`.
#[inline]
fn word(b: &[u8], big_endian: bool) -> u32 {
    let raw = [b[0], b[1], b[2], b[3]];
    if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

/// 将类型为 `ty` 的数值数据元素解码为 `f64`.
fn decode_numbers(ty: u32, bytes: &[u8], big_endian: bool) -> BrainResult<Vec<f64>> {
    macro_rules! decode {
        ($t: ty) => {{
            const N: usize = std::mem::size_of::<$t>();
            bytes
                .chunks_exact(N)
                .map(|c| {
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(c);
                    let v = if big_endian {
                        <$t>::from_be_bytes(raw)
                    } else {
                        <$t>::from_le_bytes(raw)
                    };
                    v as f64
                })
                .collect()
        }};
    }

    let data: Vec<f64> = match ty {
        MI_INT8 => decode!(i8),
        MI_UINT8 => decode!(u8),
        MI_INT16 => decode!(i16),
        MI_UINT16 => decode!(u16),
        MI_INT32 => decode!(i32),
        MI_UINT32 => decode!(u32),
        MI_SINGLE => decode!(f32),
        MI_DOUBLE => decode!(f64),
        MI_INT64 => decode!(i64),
        MI_UINT64 => decode!(u64),
        other => return Err(malformed(format!("不支持的数值类型 {other}"))),
    };
    Ok(data)
}

/// 解析 miMATRIX 元素的内容, 返回 `(变量名, 值)`.
fn parse_matrix(payload: &[u8], big_endian: bool) -> BrainResult<(String, MatValue)> {
    if payload.is_empty() {
        let empty = MatValue::Numeric {
            dims: vec![0, 0],
            data: vec![],
        };
        return Ok((String::new(), empty));
    }
    let mut cur = Cursor::new(payload, big_endian);

    let (_, flags) = cur.element(true)?;
    if flags.len() < 4 {
        return Err(malformed("数组标志过短"));
    }
    let class = (word(flags, big_endian) & 0xff) as u8;

    let (ty, dims) = cur.element(true)?;
    let dims: Vec<usize> = decode_numbers(ty, dims, big_endian)?
        .into_iter()
        .map(|d| d as usize)
        .collect();

    let (_, name) = cur.element(true)?;
    let name = String::from_utf8_lossy(name)
        .trim_end_matches('\0')
        .to_owned();

    let value = match class {
        MX_STRUCT => {
            let (_, len) = cur.element(true)?;
            if len.len() < 4 {
                return Err(malformed("结构体成员名长度缺失"));
            }
            let name_len = word(len, big_endian) as usize;
            let (_, names) = cur.element(true)?;
            let names: Vec<String> = match name_len {
                0 => vec![],
                n => names
                    .chunks(n)
                    .map(|c| String::from_utf8_lossy(c).trim_end_matches('\0').to_owned())
                    .collect(),
            };

            let mut fields = Vec::with_capacity(names.len());
            if dims.iter().product::<usize>() > 0 {
                for field in names {
                    let (ty, sub) = cur.element(true)?;
                    if ty != MI_MATRIX {
                        return Err(malformed(format!("结构体成员 `{field}` 不是矩阵")));
                    }
                    let (_, v) = parse_matrix(sub, big_endian)?;
                    fields.push((field, v));
                }
            }
            MatValue::Struct(fields)
        }
        MX_DOUBLE..=MX_UINT64 => {
            let (ty, real) = cur.element(true)?;
            let data = decode_numbers(ty, real, big_endian)?;
            if data.len() != dims.iter().product::<usize>() {
                return Err(malformed(format!(
                    "变量 `{name}` 的元素个数 {} 与维度 {dims:?} 不符",
                    data.len()
                )));
            }
            MatValue::Numeric { dims, data }
        }
        other => MatValue::Unsupported(other),
    };
    Ok((name, value))
}

/// 读入整个文件并检查文件头. 返回文件内容与字节序.
fn read_file(path: &Path) -> BrainResult<(Vec<u8>, bool)> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < HEADER_LEN {
        return Err(malformed("文件头不完整"));
    }
    let big_endian = match &bytes[126..128] {
        b"IM" => false,
        b"MI" => true,
        _ => return Err(malformed("缺少字节序标记")),
    };
    let raw = [bytes[124], bytes[125]];
    let version = if big_endian {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    };
    if version != VERSION {
        return Err(malformed(format!(
            "不支持的版本 0x{version:04x}, v7.3 文件需另存为 v7"
        )));
    }
    Ok((bytes, big_endian))
}

/// 在文件中查找名为 `name` 的顶层变量.
fn find_variable(path: &Path, name: &str) -> BrainResult<MatValue> {
    let (bytes, big_endian) = read_file(path)?;
    let mut cur = Cursor::new(&bytes[HEADER_LEN..], big_endian);
    while cur.remaining() >= 8 {
        let (ty, data) = cur.element(false)?;
        let (found, value) = match ty {
            MI_MATRIX => parse_matrix(data, big_endian)?,
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut inflated)?;
                let mut inner = Cursor::new(&inflated, big_endian);
                match inner.element(false)? {
                    (MI_MATRIX, data) => parse_matrix(data, big_endian)?,
                    _ => continue,
                }
            }
            _ => continue,
        };
        if found == name {
            return Ok(value);
        }
    }
    Err(BrainError::MissingField(name.to_owned()))
}

/// 读取变量 `name`, 得到列优先的 `[X, Y, z]` 三维数组.
///
/// 若该变量是结构体, 则读取其成员 `member`. 二维变量视为只有一层切片.
pub(super) fn read_volume(path: &Path, name: &str, member: Option<&str>) -> BrainResult<Array3<f64>> {
    let value = match (find_variable(path, name)?, member) {
        (MatValue::Struct(fields), Some(member)) => fields
            .into_iter()
            .find(|(n, _)| n == member)
            .map(|(_, v)| v)
            .ok_or_else(|| BrainError::MissingField(format!("{name}.{member}")))?,
        (value, _) => value,
    };

    let (mut dims, data) = match value {
        MatValue::Numeric { dims, data } => (dims, data),
        MatValue::Struct(_) => return Err(malformed(format!("变量 `{name}` 是结构体"))),
        MatValue::Unsupported(class) => {
            return Err(malformed(format!("变量 `{name}` 的数组类别 {class} 不受支持")))
        }
    };
    while dims.len() > 3 && dims.last() == Some(&1) {
        dims.pop();
    }
    if dims.len() == 2 {
        dims.push(1);
    }
    let &[x, y, z] = dims.as_slice() else {
        return Err(BrainError::UnsupportedFormat(path.to_owned()));
    };
    Array3::from_shape_vec((x, y, z).f(), data).map_err(|e| malformed(e.to_string()))
}

/// 写入 8 字节的元素标签.
fn put_tag(buf: &mut Vec<u8>, ty: u32, len: usize) -> BrainResult<()> {
    let len = u32::try_from(len).map_err(|_| malformed("数据元素超过 4 GiB"))?;
    buf.extend_from_slice(&ty.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

/// 写入一个完整的数据元素, 内容补齐到 8 字节.
fn put_element(buf: &mut Vec<u8>, ty: u32, data: &[u8]) -> BrainResult<()> {
    put_tag(buf, ty, data.len())?;
    buf.extend_from_slice(data);
    buf.resize(buf.len() + (8 - data.len() % 8) % 8, 0);
    Ok(())
}

/// 构建 miMATRIX 元素的内容 (不含标签).
fn matrix(class: u8, dims: &[usize], name: &str, ty: u32, real: &[u8]) -> BrainResult<Vec<u8>> {
    let mut m = Vec::with_capacity(real.len() + 64);
    put_element(&mut m, MI_UINT32, &[class, 0, 0, 0, 0, 0, 0, 0])?;
    let mut shape = Vec::with_capacity(dims.len() * 4);
    for &d in dims {
        let d = i32::try_from(d).map_err(|_| malformed(format!("维度 {d} 过大")))?;
        shape.extend_from_slice(&d.to_le_bytes());
    }
    put_element(&mut m, MI_INT32, &shape)?;
    put_element(&mut m, MI_INT8, name.as_bytes())?;
    put_element(&mut m, ty, real)?;
    Ok(m)
}

/// 小端序 Level 5 文件头.
fn header() -> [u8; HEADER_LEN] {
    let mut h = [b' '; HEADER_LEN];
    let text = b"MATLAB 5.0 MAT-file, Platform: rust, Created by: flair-berry";
    h[..text.len()].copy_from_slice(text);
    h[116..124].fill(0);
    h[124..126].copy_from_slice(&VERSION.to_le_bytes());
    h[126..128].copy_from_slice(b"IM");
    h
}

/// 将 `[X, Y, z]` 的 `u8` 数组写为只含变量 `name` 的压缩 mat 文件.
pub(super) fn write_volume(path: &Path, name: &str, data: ArrayView3<u8>) -> BrainResult<()> {
    // 列优先: 反转坐标轴后按行优先遍历.
    let real: Vec<u8> = data.t().iter().copied().collect();
    let payload = matrix(MX_UINT8, data.shape(), name, MI_UINT8, &real)?;

    let mut element = Vec::with_capacity(payload.len() + 8);
    put_tag(&mut element, MI_MATRIX, payload.len())?;
    element.extend_from_slice(&payload);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&element)?;
    let compressed = encoder.finish()?;

    let mut tag = Vec::with_capacity(8);
    put_tag(&mut tag, MI_COMPRESSED, compressed.len())?;

    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(&header())?;
    file.write_all(&tag)?;
    file.write_all(&compressed)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("flair-berry-mat-{}-{name}", std::process::id()));
        p
    }

    fn doubles(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// 未压缩的 1x1 结构体 `name`, 只有一个成员 `field`, 其值为 `inner` 矩阵.
    fn struct_file(name: &str, field: &str, inner: &[u8]) -> Vec<u8> {
        let mut m = Vec::new();
        put_element(&mut m, MI_UINT32, &[MX_STRUCT, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        put_element(&mut m, MI_INT32, &[1, 0, 0, 0, 1, 0, 0, 0]).unwrap();
        put_element(&mut m, MI_INT8, name.as_bytes()).unwrap();
        // 成员名长度使用小数据元素格式.
        m.extend_from_slice(&((4u32 << 16) | MI_INT32).to_le_bytes());
        m.extend_from_slice(&32u32.to_le_bytes());
        let mut names = field.as_bytes().to_vec();
        names.resize(32, 0);
        put_element(&mut m, MI_INT8, &names).unwrap();
        put_element(&mut m, MI_MATRIX, inner).unwrap();

        let mut file = header().to_vec();
        put_element(&mut file, MI_MATRIX, &m).unwrap();
        file
    }

    #[test]
    fn test_uint8_round_trip() {
        let path = temp_file("round.mat");
        let data = Array3::<u8>::from_shape_fn((2, 3, 4), |(x, y, z)| (x + 2 * y + 6 * z) as u8);
        write_volume(&path, "brainMask", data.view()).unwrap();

        let back = read_volume(&path, "brainMask", None).unwrap();
        assert_eq!(back.shape(), &[2, 3, 4]);
        assert_eq!(back, data.mapv(f64::from));
        assert!(matches!(
            read_volume(&path, "gt", None),
            Err(BrainError::MissingField(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_struct_member_column_major() {
        // MATLAB 维度 [2, 2, 1], 列优先存放 0, 1, 2, 3.
        let inner = matrix(MX_DOUBLE, &[2, 2, 1], "", MI_DOUBLE, &doubles(&[0.0, 1.0, 2.0, 3.0]))
            .unwrap();
        let path = temp_file("struct.mat");
        std::fs::write(&path, struct_file("im", "final", &inner)).unwrap();

        let v = read_volume(&path, "im", Some("final")).unwrap();
        assert_eq!(v.shape(), &[2, 2, 1]);
        assert_eq!(v[(1, 0, 0)], 1.0);
        assert_eq!(v[(0, 1, 0)], 2.0);
        assert!(matches!(
            read_volume(&path, "im", Some("raw")),
            Err(BrainError::MissingField(_))
        ));
        assert!(matches!(read_volume(&path, "im", None), Err(BrainError::Mat(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_plain_2d_variable_is_one_slice() {
        let payload = matrix(MX_DOUBLE, &[3, 2], "gt", MI_DOUBLE, &doubles(&[0.0; 6])).unwrap();
        let mut file = header().to_vec();
        put_element(&mut file, MI_MATRIX, &payload).unwrap();
        let path = temp_file("plain.mat");
        std::fs::write(&path, file).unwrap();

        // 普通数值变量不需要结构体成员.
        let v = read_volume(&path, "gt", Some("final")).unwrap();
        assert_eq!(v.shape(), &[3, 2, 1]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rejects_foreign_header() {
        let path = temp_file("foreign.mat");
        let mut file = header().to_vec();
        file[124..126].copy_from_slice(&0x0200u16.to_le_bytes());
        std::fs::write(&path, &file).unwrap();
        assert!(matches!(read_volume(&path, "im", None), Err(BrainError::Mat(_))));

        std::fs::write(&path, b"not a mat file").unwrap();
        assert!(matches!(read_volume(&path, "im", None), Err(BrainError::Mat(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
