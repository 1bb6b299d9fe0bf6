use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

use super::{Variable, Variables};
use crate::error::{Error, Result};

/// npz 归档成员名的后缀.
const NPY_SUFFIX: &str = ".npy";

/// 去掉成员名的 `.npy` 后缀, 得到变量名.
#[inline]
fn var_name(member: &str) -> &str {
    member.strip_suffix(NPY_SUFFIX).unwrap_or(member)
}

/// Npz 文件归档.
///
/// 该结构可用于读取 [`save_variables_to_npz`] 写入的变量,
/// 也可以读取 numpy 的 `savez` 结果.
pub struct NpzArchive {
    path: PathBuf,
    reader: NpzReader<File>,
}

impl NpzArchive {
    /// 打开路径 `p` 处的归档.
    pub fn new<P: AsRef<Path>>(p: P) -> Result<Self> {
        let path = p.as_ref().to_owned();
        if !path.exists() {
            return Err(Error::FileNotFound(path));
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok(Self {
            reader: NpzReader::new(file)?,
            path,
        })
    }

    /// 底层文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取底层 npz 文件包含的所有变量名 (不含 `.npy` 后缀).
    pub fn names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .reader
            .names()?
            .iter()
            .map(|n| var_name(n).to_owned())
            .collect())
    }

    /// 获取底层 npz 文件的变量个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.reader.len()
    }

    /// 归档是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    /// 通过 npz 数值索引获取变量. 依次尝试所有支持的元素类型.
    pub fn by_index(&mut self, index: usize) -> Result<Variable> {
        let reader = &mut self.reader;
        macro_rules! try_read {
            ($first: ty $(, $t: ty)*) => {
                reader
                    .by_index::<OwnedRepr<$first>, IxDyn>(index)
                    .map(Variable::from)
                    $(.or_else(|_| reader.by_index::<OwnedRepr<$t>, IxDyn>(index).map(Variable::from)))*
            };
        }
        Ok(try_read!(f64, f32, i64, i32, u8, bool)?)
    }

    /// 通过变量名获取变量. `name` 可以带或不带 `.npy` 后缀.
    pub fn by_name(&mut self, name: &str) -> Result<Variable> {
        let wanted = var_name(name);
        let index = self
            .reader
            .names()?
            .iter()
            .position(|n| var_name(n) == wanted)
            .ok_or_else(|| Error::VariableNotFound {
                name: wanted.to_owned(),
                file: self.path.clone(),
            })?;
        self.by_index(index)
    }

    /// 以 `f64` 读取给定变量. 元素类型不是 `f64` 时返回 `Err`.
    pub fn f64_by_name(&mut self, name: &str) -> Result<ArrayD<f64>> {
        match self.by_name(name)? {
            Variable::F64(arr) => Ok(arr),
            other => Err(Error::VariableType {
                name: name.to_owned(),
                expected: "f64",
                found: other.type_name(),
            }),
        }
    }
}

/// 将 `variables` 写入压缩 npz 归档. 写入时成员名会被追加 `.npy` 后缀.
pub fn save_variables_to_npz<P: AsRef<Path>>(path: P, variables: &Variables) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut npz = NpzWriter::new_compressed(file);
    for (name, var) in variables {
        let member = var_name(name);
        let added = match var {
            Variable::F64(a) => npz.add_array(member, a),
            Variable::F32(a) => npz.add_array(member, a),
            Variable::I64(a) => npz.add_array(member, a),
            Variable::I32(a) => npz.add_array(member, a),
            Variable::U8(a) => npz.add_array(member, a),
            Variable::Bool(a) => npz.add_array(member, a),
        };
        added.map_err(|e| {
            log::error!("Error shelving variable {name}: {e}");
            e
        })?;
    }
    npz.finish()?;
    Ok(())
}

/// 读取 npz 归档中的全部变量.
pub fn load_variables_from_npz<P: AsRef<Path>>(path: P) -> Result<Variables> {
    let mut archive = NpzArchive::new(path)?;
    let names = archive.names()?;
    let mut ans = Variables::new();
    for (i, name) in names.into_iter().enumerate() {
        let var = archive.by_index(i).map_err(|e| {
            log::error!("Error reading variable {name} from {}: {e}", archive.path().display());
            e
        })?;
        ans.insert(name, var);
    }
    Ok(ans)
}
