//! HDF5 (`.hdf5`/`.h5`) 变量读写. 需要打开 `hdf5` feature, 并在系统中安装 libhdf5.
//!
//! 未打开该 feature 时, 所有函数都返回 `Err(Error::FeatureDisabled)`.

use std::path::Path;

#[allow(unused_imports)]
use super::{Variable, Variables};
use crate::error::{Error, Result};

/// 检查文件存在.
fn check_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound(path.to_owned()))
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "hdf5")] {
        use ::hdf5::types::{FloatSize, IntSize, TypeDescriptor};
        use ::hdf5::{Dataset, File, Group};

        /// 获取 `h5path` 处的 group, 不存在时创建.
        fn require_group(file: &File, h5path: &str) -> Result<Group> {
            Ok(file.group(h5path).or_else(|_| file.create_group(h5path))?)
        }

        /// 按数据集的存储类型读取为 [`Variable`]. 其他类型统一读为 `f64`.
        fn read_dataset(ds: &Dataset) -> Result<Variable> {
            let var = match ds.dtype()?.to_descriptor()? {
                TypeDescriptor::Float(FloatSize::U4) => ds.read_dyn::<f32>()?.into(),
                TypeDescriptor::Integer(IntSize::U8) => ds.read_dyn::<i64>()?.into(),
                TypeDescriptor::Integer(IntSize::U4) => ds.read_dyn::<i32>()?.into(),
                TypeDescriptor::Unsigned(IntSize::U1) => ds.read_dyn::<u8>()?.into(),
                TypeDescriptor::Boolean => ds.read_dyn::<bool>()?.into(),
                _ => ds.read_dyn::<f64>()?.into(),
            };
            Ok(var)
        }

        /// 数据集完整路径的最后一段.
        fn basename(name: &str) -> String {
            name.rsplit('/').next().unwrap_or(name).to_owned()
        }

        /// 将 `variables` 写入 `path` 中 `h5path` group 下的同名数据集.
        /// 已存在的文件会被覆盖.
        pub fn save_variables_to_hdf5<P: AsRef<Path>>(path: P, variables: &Variables, h5path: &str) -> Result<()> {
            let file = File::create(path.as_ref())?;
            let group = require_group(&file, h5path)?;
            for (name, var) in variables {
                let builder = group.new_dataset_builder();
                let created = match var {
                    Variable::F64(a) => builder.with_data(a).create(name.as_str()),
                    Variable::F32(a) => builder.with_data(a).create(name.as_str()),
                    Variable::I64(a) => builder.with_data(a).create(name.as_str()),
                    Variable::I32(a) => builder.with_data(a).create(name.as_str()),
                    Variable::U8(a) => builder.with_data(a).create(name.as_str()),
                    Variable::Bool(a) => builder.with_data(a).create(name.as_str()),
                };
                created.map_err(|e| {
                    log::error!("Error saving {name} in {}: {e}", path.as_ref().display());
                    e
                })?;
            }
            Ok(())
        }

        /// 获取 `path` 中 `h5path` group 下所有数据集的完整路径.
        pub fn load_varnames_from_hdf5<P: AsRef<Path>>(path: P, h5path: &str) -> Result<Vec<String>> {
            check_exists(path.as_ref())?;
            let file = File::open(path.as_ref())?;
            let group = file.group(h5path).map_err(|e| {
                log::error!("Error reading {}: {e}", path.as_ref().display());
                e
            })?;
            Ok(group.datasets()?.iter().map(|ds| ds.name()).collect())
        }

        /// 读取 `path` 中 `h5path` group 下的所有数据集, 以数据集名为键.
        pub fn load_variables_from_hdf5<P: AsRef<Path>>(path: P, h5path: &str) -> Result<Variables> {
            check_exists(path.as_ref())?;
            let file = File::open(path.as_ref())?;
            let group = file.group(h5path)?;
            let mut ans = Variables::new();
            for ds in group.datasets()? {
                let var = read_dataset(&ds).map_err(|e| {
                    log::error!("Error reading {} from {}: {e}", ds.name(), path.as_ref().display());
                    e
                })?;
                ans.insert(basename(&ds.name()), var);
            }
            Ok(ans)
        }
    } else {
        /// 将 `variables` 写入 HDF5 文件. 未打开 `hdf5` feature.
        pub fn save_variables_to_hdf5<P: AsRef<Path>>(path: P, _variables: &Variables, _h5path: &str) -> Result<()> {
            log::error!("Cannot write {}: built without HDF5 support.", path.as_ref().display());
            Err(Error::FeatureDisabled("hdf5"))
        }

        /// 获取 HDF5 文件中的数据集名. 未打开 `hdf5` feature.
        pub fn load_varnames_from_hdf5<P: AsRef<Path>>(path: P, _h5path: &str) -> Result<Vec<String>> {
            check_exists(path.as_ref())?;
            Err(Error::FeatureDisabled("hdf5"))
        }

        /// 读取 HDF5 文件中的数据集. 未打开 `hdf5` feature.
        pub fn load_variables_from_hdf5<P: AsRef<Path>>(path: P, _h5path: &str) -> Result<Variables> {
            check_exists(path.as_ref())?;
            Err(Error::FeatureDisabled("hdf5"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "hdf5")]
    #[test]
    fn test_hdf5_round_trip() {
        use ndarray::{arr1, arr2};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.h5");
        let mut vars = Variables::new();
        vars.insert("data".into(), arr2(&[[1.0, 2.0], [3.0, 4.0]]).into());
        vars.insert("vol_shape".into(), arr1(&[2i64, 3, 4]).into());
        save_variables_to_hdf5(&path, &vars, "/").unwrap();

        let mut names = load_varnames_from_hdf5(&path, "/").unwrap();
        names.sort();
        assert_eq!(names, vec!["/data", "/vol_shape"]);
        assert_eq!(load_variables_from_hdf5(&path, "/").unwrap(), vars);
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_hdf5_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.h5");
        assert!(matches!(
            save_variables_to_hdf5(&path, &Variables::new(), "/"),
            Err(Error::FeatureDisabled("hdf5"))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_variables_from_hdf5("/no/such/file.h5", "/"),
            Err(Error::FileNotFound(_))
        ));
    }
}
