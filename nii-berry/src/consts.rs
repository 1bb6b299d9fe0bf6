//! 通用常量.

/// 掩膜中背景体素的原始取值.
pub const MASK_BACKGROUND: f64 = 0.0;

/// 二值化的默认阈值.
pub const DEFAULT_BINARISE_THRESHOLD: f64 = 0.0;

/// 导出文件相关的扩展名. 所有扩展名均为小写, 且包含前导 `.`.
pub mod ext {
    /// 变量归档, 实际以 npz 格式写入.
    pub const PYSHELF: &str = ".pyshelf";

    /// 同 [`PYSHELF`].
    pub const SHELF: &str = ".shelf";

    /// 标准 npz 扩展名.
    pub const NPZ: &str = ".npz";

    /// MATLAB level 5 文件.
    pub const MAT: &str = ".mat";

    /// HDF5 文件.
    pub const HDF5: &str = ".hdf5";

    /// 同 [`HDF5`].
    pub const H5: &str = ".h5";

    /// 没有扩展名时自动添加的默认扩展名.
    pub const DEFAULT: &str = PYSHELF;
}

/// 配置文件相关常量.
pub mod rc {
    /// 变量插值的最大递归深度.
    pub const MAX_INTERPOLATION_DEPTH: usize = 10;

    /// 所有 section 都会继承的默认 section 名.
    pub const DEFAULT_SECTION: &str = "DEFAULT";

    /// 命令行参数中, 指定额外配置文件的键.
    pub const CONFIG_KEY: &str = "config";

    /// 命令行参数中, 指定额外搜索目录的键.
    pub const PATH_KEY: &str = "path";
}

/// 任务队列相关常量.
pub mod condor {
    /// 查询队列状态的默认程序.
    pub const STATUS: &str = "condor_status";

    /// 提交任务的默认程序.
    pub const SUBMIT: &str = "condor_qsub";

    /// 执行 shell 命令的解释器.
    pub const SHELL: &str = "sh";
}
