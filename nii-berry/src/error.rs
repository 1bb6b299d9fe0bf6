//! 运行时错误.

use std::path::PathBuf;

use thiserror::Error;

/// 本 crate 所有操作的运行时错误.
#[derive(Error, Debug)]
pub enum Error {
    /// 文件不存在.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// nifti 文件解码或写入错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 其他底层 I/O 错误.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 两幅图像的形状或仿射矩阵不一致.
    #[error("images {one} and {another} are not compatible: {reason}")]
    NotCompatible {
        /// 第一幅图像的描述.
        one: String,
        /// 第二幅图像的描述.
        another: String,
        /// 不一致的具体原因.
        reason: String,
    },

    /// 掩膜取值不合法 (取值个数不对, 或缺少背景值 0).
    #[error("invalid mask: {0}")]
    InvalidMask(String),

    /// 掩膜全为背景, 且调用方不允许空掩膜.
    #[error("given mask is invalid because it masks all data")]
    EmptyMask,

    /// 需要 3D 图像, 但给出的图像无法压缩为 3D.
    #[error("image {image} is not 3D, shape: {shape:?}")]
    NotThreeD {
        /// 图像描述.
        image: String,
        /// 实际形状.
        shape: Vec<usize>,
    },

    /// 文件列表为空.
    #[error("empty file list")]
    EmptyFileList,

    /// 体素值无法用目标元素类型表示.
    #[error("value {value} of {file} cannot be represented in the output element type")]
    Cast {
        /// 原始体素值.
        value: f64,
        /// 所在文件.
        file: String,
    },

    /// ndarray 形状错误.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 变量名个数与变量个数不一致.
    #[error("got {names} variable names but {values} variables")]
    VarListLength {
        /// 变量名个数.
        names: usize,
        /// 变量个数.
        values: usize,
    },

    /// 读取 npz 归档错误.
    #[error("npz read error: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// 写入 npz 归档错误.
    #[error("npz write error: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// 归档中不存在给定变量.
    #[error("variable {name} not found in {}", .file.display())]
    VariableNotFound {
        /// 变量名.
        name: String,
        /// 归档路径.
        file: PathBuf,
    },

    /// 变量的元素类型与期望不符.
    #[error("variable {name} has element type {found}, expected {expected}")]
    VariableType {
        /// 变量名.
        name: String,
        /// 期望的元素类型.
        expected: &'static str,
        /// 实际的元素类型.
        found: &'static str,
    },

    /// 写入 MAT 文件错误.
    #[error("mat error: {0}")]
    Mat(String),

    /// HDF5 读写错误.
    #[cfg(feature = "hdf5")]
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// 所需功能未在编译期开启.
    #[error("cargo feature `{0}` is disabled")]
    FeatureDisabled(&'static str),

    /// ini 配置文件解析错误.
    #[error("ini error: {0}")]
    Ini(#[from] ini::Error),

    /// ini 变量插值错误.
    #[error("bad interpolation of option {option} in section [{section}]: {reason}")]
    Interpolation {
        /// 所在 section.
        section: String,
        /// 选项名.
        option: String,
        /// 原因.
        reason: String,
    },

    /// 任何地方都没有找到应用的配置.
    #[error("could not find any rcfile for application {0}")]
    SettingsNotFound(String),

    /// 所有 rcfile 中都没有 section.
    #[error("no sections found in {0} rcfiles")]
    NoSections(String),

    /// 在 section 中找不到选项.
    #[error("option {option} not found in {section} section")]
    OptionNotFound {
        /// 选项名.
        option: String,
        /// section 名.
        section: String,
    },

    /// 配置项的值不合法.
    #[error("invalid value {value:?} for option {option}")]
    InvalidSetting {
        /// 选项名.
        option: String,
        /// 实际的值.
        value: String,
    },

    /// 既不是已存在的路径, 也不能通过 rcfile 变量解析为已存在的路径.
    #[error("could not find the path {path} (from {rcpath} in {app}rc)")]
    PathNotFound {
        /// 原始查询值.
        rcpath: String,
        /// 应用名.
        app: String,
        /// 最终尝试的路径.
        path: String,
    },

    /// 在 `PATH` 中找不到程序.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// 空命令.
    #[error("empty command")]
    EmptyCommand,
}

/// 本 crate 的运行时结果.
pub type Result<T> = std::result::Result<T, Error>;
