#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 nifti 神经影像的掩膜提取、批量堆叠与变量导出,
//! 以及 rcfile 配置读取与任务队列提交等工具函数.
//!
//! 该 crate 只提供 `safe` 接口, 所有操作都是单线程同步执行的.
//!
//! # 注意
//!
//! 1. 图像数据保持 nifti 原始轴序 `(x, y, z[, t])`, 掩膜下标按行优先序给出.
//! 2. 库内错误会先以 `log::error!` 记录上下文, 再原样向上传递.
//!   调用方需要自行初始化日志后端 (例如 `simple_logger`).
//!
//! # 开发计划
//!
//! ### 图像访问与兼容性检查 ✅
//!
//! 路径与已加载图像共用 `ImageLike` 接口. 兼容性检查只读取 header.
//!
//! 实现位于 `nii-berry/src/data`.
//!
//! ### 掩膜校验与提取 ✅
//!
//! 掩膜只能包含一个或两个取值, 有两个取值时其中之一必须为 0.
//! 支持 3D 图像和沿时间轴广播的 4D 图像.
//!
//! 实现位于 `nii-berry/src/mask`.
//!
//! ### 批量堆叠 ✅
//!
//! 将同形状的一组图像按掩膜提取后逐行堆叠为矩阵.
//!
//! 实现位于 `nii-berry/src/dataset`.
//!
//! ### 变量导出 ✅
//!
//! 按扩展名导出为 npz (`.pyshelf`/`.shelf`/`.npz`), MATLAB (`.mat`)
//! 或 HDF5 (`.hdf5`/`.h5`, 需打开 `hdf5` feature).
//!
//! 实现位于 `nii-berry/src/storage`.
//!
//! ### rcfile 配置 ✅
//!
//! 合并环境变量, ini 配置文件 (支持主机专属 section) 与命令行参数.
//!
//! 实现位于 `nii-berry/src/rcfile`.
//!
//! ### 任务队列提交 ✅
//!
//! 提交到 HTCondor 队列, 失败时直接在本地执行.
//!
//! 实现位于 `nii-berry/src/commands.rs`.
//!
//! ### 支持 4D 图像的批量堆叠 ⌛️
//!
//! 目前批量堆叠只接受 3D 图像.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// nii 文件基础数据结构.
pub mod data;

pub use data::{check_img, get_img_data, get_img_info, ImageLike, NeuroImage, NiftiHeaderAttr};

pub mod consts;

mod error;

pub use error::{Error, Result};

pub mod mask;

pub use mask::{Mask, MaskedData};

pub mod dataset;

pub mod storage;

pub mod rcfile;

pub mod commands;

pub mod prelude;
