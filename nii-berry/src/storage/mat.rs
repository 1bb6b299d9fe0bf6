//! MATLAB level 5 (`.mat`) 文件的写入, 以及变量名的读取.
//!
//! 所有数值均以小端序写入, 数组按列优先序存储. 一维数组保存为行向量.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::ArrayD;

use super::{Variable, Variables};
use crate::error::{Error, Result};

/// 文件头中描述文本的长度.
const HEADER_TEXT_LEN: usize = 116;

/// 文件头总长度.
const HEADER_LEN: usize = 128;

const MAT_VERSION: u16 = 0x0100;

/// 以本机字节序写入时, 小端文件中读出的字节为 `IM`.
const ENDIAN_INDICATOR: u16 = 0x4D49;

/// 数据元素类型.
mod mi {
    pub const INT8: u32 = 1;
    pub const UINT8: u32 = 2;
    pub const INT32: u32 = 5;
    pub const UINT32: u32 = 6;
    pub const SINGLE: u32 = 7;
    pub const DOUBLE: u32 = 9;
    pub const INT64: u32 = 12;
    pub const MATRIX: u32 = 14;
    pub const COMPRESSED: u32 = 15;
}

/// 数组类型.
mod mx {
    pub const DOUBLE: u32 = 6;
    pub const SINGLE: u32 = 7;
    pub const UINT8: u32 = 9;
    pub const INT32: u32 = 12;
    pub const INT64: u32 = 14;
}

/// 数组标志中的 logical 位.
const LOGICAL_FLAG: u32 = 0x0200;

#[inline]
fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn to_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Mat(format!("{what} is too large: {len} bytes")))
}

fn write_tag(buf: &mut Vec<u8>, ty: u32, len: u32) {
    buf.extend_from_slice(&ty.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
}

/// 写入完整数据元素, 并将数据补齐到 8 字节边界.
fn write_element(buf: &mut Vec<u8>, ty: u32, data: &[u8]) -> Result<()> {
    write_tag(buf, ty, to_u32(data.len(), "data element")?);
    buf.extend_from_slice(data);
    buf.resize(buf.len() + padding(data.len()), 0);
    Ok(())
}

/// 按列优先序展开数组并转为小端字节.
fn column_major_bytes<T, const N: usize>(arr: &ArrayD<T>, to_bytes: fn(&T) -> [u8; N]) -> Vec<u8> {
    let mut ans = Vec::with_capacity(arr.len() * N);
    for v in arr.t().iter() {
        ans.extend_from_slice(&to_bytes(v));
    }
    ans
}

/// MAT 文件至少需要两个维度.
fn mat_dims(shape: &[usize]) -> Vec<usize> {
    match shape {
        [] => vec![1, 1],
        [n] => vec![1, *n],
        _ => shape.to_vec(),
    }
}

/// 将一个变量编码为 `miMATRIX` 数据元素, 包括标签.
fn encode_matrix(name: &str, var: &Variable) -> Result<Vec<u8>> {
    if name.is_empty() || !name.is_ascii() {
        return Err(Error::Mat(format!("invalid variable name {name:?}")));
    }

    let (class, data_type, data) = match var {
        Variable::F64(a) => (mx::DOUBLE, mi::DOUBLE, column_major_bytes(a, |v| v.to_le_bytes())),
        Variable::F32(a) => (mx::SINGLE, mi::SINGLE, column_major_bytes(a, |v| v.to_le_bytes())),
        Variable::I64(a) => (mx::INT64, mi::INT64, column_major_bytes(a, |v| v.to_le_bytes())),
        Variable::I32(a) => (mx::INT32, mi::INT32, column_major_bytes(a, |v| v.to_le_bytes())),
        Variable::U8(a) => (mx::UINT8, mi::UINT8, column_major_bytes(a, |v| [*v])),
        Variable::Bool(a) => (
            mx::UINT8 | LOGICAL_FLAG,
            mi::UINT8,
            column_major_bytes(a, |v| [u8::from(*v)]),
        ),
    };

    let mut body = Vec::new();

    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&class.to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());
    write_element(&mut body, mi::UINT32, &flags)?;

    let mut dims = Vec::new();
    for d in mat_dims(var.shape()) {
        let d = i32::try_from(d).map_err(|_| Error::Mat(format!("dimension {d} of {name} is too large")))?;
        dims.extend_from_slice(&d.to_le_bytes());
    }
    write_element(&mut body, mi::INT32, &dims)?;

    write_element(&mut body, mi::INT8, name.as_bytes())?;
    write_element(&mut body, data_type, &data)?;

    let mut ans = Vec::with_capacity(body.len() + 8);
    write_tag(&mut ans, mi::MATRIX, to_u32(body.len(), name)?);
    ans.extend_from_slice(&body);
    Ok(ans)
}

/// 128 字节文件头.
fn header() -> [u8; HEADER_LEN] {
    let mut ans = [0u8; HEADER_LEN];
    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: nii-berry {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );
    let text = text.as_bytes();
    let n = text.len().min(HEADER_TEXT_LEN);
    ans[..n].copy_from_slice(&text[..n]);
    ans[n..HEADER_TEXT_LEN].fill(b' ');
    // 124..126 为版本号, 126..128 为字节序标记.
    ans[124..126].copy_from_slice(&MAT_VERSION.to_le_bytes());
    ans[126..128].copy_from_slice(&ENDIAN_INDICATOR.to_le_bytes());
    ans
}

/// 将 `variables` 保存为 MATLAB level 5 文件. `compress` 为 `true` 时,
/// 每个变量以 zlib 压缩的 `miCOMPRESSED` 元素写入.
pub fn save_variables_to_mat<P: AsRef<Path>>(path: P, variables: &Variables, compress: bool) -> Result<()> {
    let mut file = BufWriter::new(File::create(path.as_ref())?);
    file.write_all(&header())?;

    for (name, var) in variables {
        let element = encode_matrix(name, var).map_err(|e| {
            log::error!("Error encoding variable {name}: {e}");
            e
        })?;
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let compressed = encoder.finish()?;
            let mut tag = Vec::with_capacity(8);
            write_tag(&mut tag, mi::COMPRESSED, to_u32(compressed.len(), name)?);
            file.write_all(&tag)?;
            file.write_all(&compressed)?;
        } else {
            file.write_all(&element)?;
        }
    }
    file.flush()?;
    Ok(())
}

/// 从 `buf` 的 `pos` 处读取一个小端 `u32`.
fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    buf.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::Mat(format!("unexpected end of data at byte {pos}")))
}

/// 读取子元素, 返回 `(类型, 数据, 下一个子元素的位置)`. 支持压缩小数据元素格式.
fn read_subelement(buf: &[u8], pos: usize) -> Result<(u32, &[u8], usize)> {
    let first = read_u32(buf, pos)?;
    let small_len = (first >> 16) as usize;
    let (ty, start, len, next) = if small_len != 0 {
        (first & 0xFFFF, pos + 4, small_len, pos + 8)
    } else {
        let len = read_u32(buf, pos + 4)? as usize;
        (first, pos + 8, len, pos + 8 + len + padding(len))
    };
    let data = buf
        .get(start..start + len)
        .ok_or_else(|| Error::Mat(format!("truncated element at byte {pos}")))?;
    Ok((ty, data, next))
}

/// 从 `miMATRIX` 元素数据中读取变量名.
fn matrix_name(body: &[u8]) -> Result<String> {
    let (_, _, next) = read_subelement(body, 0)?;
    let (_, _, next) = read_subelement(body, next)?;
    let (ty, name, _) = read_subelement(body, next)?;
    if ty != mi::INT8 {
        return Err(Error::Mat(format!("unexpected array name type {ty}")));
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

/// 读取 MATLAB level 5 文件中所有顶层变量的名字.
pub fn load_varnames_from_mat<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_owned()));
    }
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() < HEADER_LEN || &buf[126..128] != b"IM" {
        return Err(Error::Mat(format!(
            "{} is not a little-endian level 5 MAT-file",
            path.display()
        )));
    }

    let mut ans = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < buf.len() {
        let ty = read_u32(&buf, pos)?;
        let len = read_u32(&buf, pos + 4)? as usize;
        let data = buf
            .get(pos + 8..pos + 8 + len)
            .ok_or_else(|| Error::Mat(format!("truncated element at byte {pos}")))?;
        match ty {
            mi::MATRIX => {
                ans.push(matrix_name(data)?);
                pos += 8 + len + padding(len);
            }
            mi::COMPRESSED => {
                let mut inner = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut inner)?;
                if read_u32(&inner, 0)? == mi::MATRIX {
                    ans.push(matrix_name(inner.get(8..).unwrap_or_default())?);
                }
                pos += 8 + len;
            }
            _ => pos += 8 + len + padding(len),
        }
    }
    Ok(ans)
}
