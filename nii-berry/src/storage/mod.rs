//! 变量导出: 将一组具名数组按输出文件扩展名写入 npz, MATLAB 或 HDF5 文件.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ndarray::{Array, Array1, Array2, ArrayD, Dimension};

use crate::consts::ext;
use crate::error::{Error, Result};
use crate::Idx3d;

pub mod h5;
pub mod mat;
mod npz_archive;

pub use npz_archive::{load_variables_from_npz, save_variables_to_npz, NpzArchive};

/// 一个可导出的 n 维数组. 每个变体对应一种元素类型.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variable {
    /// `f64` 数组.
    F64(ArrayD<f64>),
    /// `f32` 数组.
    F32(ArrayD<f32>),
    /// `i64` 数组.
    I64(ArrayD<i64>),
    /// `i32` 数组.
    I32(ArrayD<i32>),
    /// `u8` 数组.
    U8(ArrayD<u8>),
    /// 布尔数组.
    Bool(ArrayD<bool>),
}

/// 变量名到变量的映射. 按变量名排序, 以保证导出顺序稳定.
pub type Variables = BTreeMap<String, Variable>;

macro_rules! impl_variable_from {
    ($($t: ty => $variant: ident),+ $(,)?) => {
        $(
            impl<D: Dimension> From<Array<$t, D>> for Variable {
                #[inline]
                fn from(arr: Array<$t, D>) -> Self {
                    Variable::$variant(arr.into_dyn())
                }
            }
        )+
    };
}

impl_variable_from!(
    f64 => F64,
    f32 => F32,
    i64 => I64,
    i32 => I32,
    u8 => U8,
    bool => Bool,
);

impl Variable {
    /// 将掩膜体素下标保存为形状为 `(3, n)` 的 `i64` 数组,
    /// 每一行对应一个空间轴.
    pub fn from_indices(indices: &[Idx3d]) -> Self {
        let arr = Array2::from_shape_fn((3, indices.len()), |(axis, i)| {
            let (x, y, z) = indices[i];
            [x, y, z][axis] as i64
        });
        arr.into()
    }

    /// 将形状保存为一维 `i64` 数组.
    pub fn from_shape(shape: &[usize]) -> Self {
        Array1::from_iter(shape.iter().map(|d| *d as i64)).into()
    }

    /// 数组形状.
    pub fn shape(&self) -> &[usize] {
        match self {
            Variable::F64(a) => a.shape(),
            Variable::F32(a) => a.shape(),
            Variable::I64(a) => a.shape(),
            Variable::I32(a) => a.shape(),
            Variable::U8(a) => a.shape(),
            Variable::Bool(a) => a.shape(),
        }
    }

    /// 元素类型名, 用于日志.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variable::F64(_) => "f64",
            Variable::F32(_) => "f32",
            Variable::I64(_) => "i64",
            Variable::I32(_) => "i32",
            Variable::U8(_) => "u8",
            Variable::Bool(_) => "bool",
        }
    }
}

/// 根据扩展名决定的导出格式.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `.pyshelf`, `.shelf` 或 `.npz`.
    Npz,
    /// `.mat`.
    Mat,
    /// `.hdf5` 或 `.h5`.
    Hdf5,
}

impl ExportFormat {
    /// 由小写扩展名 (包含前导 `.`) 得到导出格式. 不支持的扩展名返回 `None`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            ext::PYSHELF | ext::SHELF | ext::NPZ => Some(Self::Npz),
            ext::MAT => Some(Self::Mat),
            ext::HDF5 | ext::H5 => Some(Self::Hdf5),
            _ => None,
        }
    }
}

/// 获取小写的文件扩展名, 包含前导 `.`. 没有扩展名时返回空串.
fn get_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// 变量导出入口.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportData;

impl ExportData {
    /// 将 `variables` 保存到 `path`, 格式由扩展名 (不区分大小写) 决定:
    ///
    /// - `.pyshelf`, `.shelf`, `.npz`: npz 归档;
    /// - `.mat`: MATLAB level 5 文件;
    /// - `.hdf5`, `.h5`: HDF5 文件 (需要 `hdf5` feature).
    ///
    /// # 返回值
    ///
    /// 实际写入的文件路径. `path` 没有扩展名时会追加 `.pyshelf`.
    /// 扩展名不受支持时只记录错误日志, 不写入任何文件, 返回 `Ok(None)`.
    pub fn save_variables<P: AsRef<Path>>(path: P, variables: &Variables) -> Result<Option<PathBuf>> {
        let path = path.as_ref();
        let mut extension = get_extension(path);
        let mut output = path.to_owned();
        if extension.is_empty() {
            output.as_mut_os_string().push(ext::DEFAULT);
            extension = ext::DEFAULT.to_owned();
        }

        let Some(format) = ExportFormat::from_extension(&extension) else {
            log::error!("Filename extension {extension} not accepted.");
            return Ok(None);
        };

        log::debug!(
            "Saving variables [{}] to {}.",
            variables.keys().map(String::as_str).collect::<Vec<_>>().join(", "),
            output.display()
        );
        let saved = match format {
            ExportFormat::Npz => save_variables_to_npz(&output, variables),
            ExportFormat::Mat => mat::save_variables_to_mat(&output, variables, false),
            ExportFormat::Hdf5 => h5::save_variables_to_hdf5(&output, variables, "/"),
        };
        saved.map_err(|e| {
            log::error!("Error saving to {}: {e}", output.display());
            e
        })?;
        Ok(Some(output))
    }

    /// 与 [`ExportData::save_variables`] 相同, 但变量名与变量分别以列表给出.
    ///
    /// 两个列表长度不一致时返回 `Err(Error::VarListLength)`.
    pub fn save_varlist<P, S>(path: P, names: &[S], values: Vec<Variable>) -> Result<Option<PathBuf>>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        if names.len() != values.len() {
            return Err(Error::VarListLength {
                names: names.len(),
                values: values.len(),
            });
        }
        let variables = names
            .iter()
            .map(|n| n.as_ref().to_owned())
            .zip(values)
            .collect();
        Self::save_variables(path, &variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn sample() -> Variables {
        let mut vars = Variables::new();
        vars.insert("data".into(), arr2(&[[1.0, 2.0], [3.0, 4.0]]).into());
        vars.insert("labels".into(), arr1(&[1u8, 0, 1]).into());
        vars
    }

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(ExportFormat::from_extension(".shelf"), Some(ExportFormat::Npz));
        assert_eq!(ExportFormat::from_extension(".h5"), Some(ExportFormat::Hdf5));
        assert_eq!(ExportFormat::from_extension(".mat"), Some(ExportFormat::Mat));
        assert_eq!(ExportFormat::from_extension(".txt"), None);
        assert_eq!(get_extension(Path::new("a/b.MAT")), ".mat");
        assert_eq!(get_extension(Path::new("a/b")), "");
    }

    #[test]
    fn test_unknown_extension_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        assert_eq!(ExportData::save_variables(&path, &sample()).unwrap(), None);
        assert!(!path.exists());
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_hdf5_export_needs_feature() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["out.h5", "out.HDF5"] {
            let path = dir.path().join(name);
            assert!(matches!(
                ExportData::save_variables(&path, &sample()),
                Err(Error::FeatureDisabled("hdf5"))
            ));
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_missing_extension_defaults_to_pyshelf() {
        let dir = tempfile::tempdir().unwrap();
        let saved = ExportData::save_variables(dir.path().join("out"), &sample())
            .unwrap()
            .unwrap();
        assert_eq!(saved, dir.path().join("out.pyshelf"));
        let back = load_variables_from_npz(&saved).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_save_varlist_length_mismatch() {
        let err = ExportData::save_varlist("x.mat", &["a", "b"], vec![arr1(&[1.0]).into()]).unwrap_err();
        assert!(matches!(err, Error::VarListLength { names: 2, values: 1 }));
    }

    #[test]
    fn test_from_indices() {
        let v = Variable::from_indices(&[(1, 2, 3), (4, 5, 6)]);
        assert_eq!(v.shape(), &[3, 2]);
        assert_eq!(v, Variable::I64(arr2(&[[1, 4], [2, 5], [3, 6]]).into_dyn()));
        assert_eq!(Variable::from_shape(&[2, 3, 4]).type_name(), "i64");
    }
}
