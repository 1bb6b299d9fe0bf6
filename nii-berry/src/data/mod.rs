use std::borrow::Cow;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn, Slice};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{Error, Result};

pub mod affine;
pub mod check;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 从 header 获取数据形状, 按 nifti 原始轴序 (x, y, z, t, ...) 排列.
#[inline]
pub(crate) fn get_shape_from_header(h: &NiftiHeader) -> Vec<usize> {
    let ndim = (h.dim[0] as usize).clamp(1, 7);
    h.dim[1..=ndim].iter().map(|d| *d as usize).collect()
}

/// 将 `shape` 同步到 header 的 `dim` 字段.
fn write_shape_to_header(h: &mut NiftiHeader, shape: &[usize]) {
    h.dim = [1; 8];
    h.dim[0] = shape.len() as _;
    for (slot, len) in h.dim[1..].iter_mut().zip(shape) {
        *slot = *len as _;
    }
}

/// nifti 图像 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Vec<usize> {
        get_shape_from_header(self.header())
    }

    /// 数据维数.
    #[inline]
    fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// 获取体素索引到物理空间坐标的 4x4 仿射矩阵.
    #[inline]
    fn affine(&self) -> Array2<f64> {
        affine::from_header(self.header())
    }

    /// 获取单个体素在三个空间维度上的分辨率, 以毫米为单位.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// nii 格式神经影像, 包括 header 和体素数据. 体素值以 `f64` 保存.
///
/// 数据保持 nifti 原始轴序, 即 `(x, y, z)` 或 `(x, y, z, t)`.
#[derive(Debug, Clone)]
pub struct NeuroImage {
    header: BoxedHeader,
    data: ArrayD<f64>,
}

impl NiftiHeaderAttr for NeuroImage {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl NeuroImage {
    /// 打开 `.nii` 或 `.nii.gz` 文件. `path` 为本地路径.
    ///
    /// 文件不存在时返回 `Err(Error::FileNotFound)`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_owned()));
        }
        let obj = ReaderOptions::new().read_file(path)?;
        let header = Box::new(obj.header().clone());
        let data = obj.into_volume().into_ndarray::<f64>()?;
        Ok(Self { header, data })
    }

    /// 根据裸数据和仿射矩阵直接创建图像. header 的 `dim`, `pixdim`
    /// 和 sform 部分会按照参数填写.
    pub fn new(data: ArrayD<f64>, affine: ArrayView2<f64>) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        write_shape_to_header(&mut header, data.shape());
        affine::write_to_header(&mut header, affine);
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        Self { header, data }
    }

    /// 以已有 header 为模板创建图像. header 的 `dim` 会被替换为 `data` 的形状.
    pub fn from_parts(header: &NiftiHeader, data: ArrayD<f64>) -> Self {
        let mut header = Box::new(header.clone());
        write_shape_to_header(&mut header, data.shape());
        Self { header, data }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayViewD<'_, f64> {
        self.data.view()
    }

    /// 取出数据.
    #[inline]
    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }

    /// 以 nifti 格式保存到 `path`. 以 `.gz` 结尾时自动压缩.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&self.data)?;
        Ok(())
    }

    /// 保证图像是 3D 的.
    ///
    /// 末维长度为 1 的 4D 图像会被压缩为 3D; 其他非 3D 图像返回
    /// `Err(Error::NotThreeD)`.
    pub fn into_3d(self) -> Result<Self> {
        match self.data.ndim() {
            3 => Ok(self),
            4 if self.data.len_of(Axis(3)) == 1 => {
                let data = self.data.index_axis_move(Axis(3), 0);
                Ok(Self::from_parts(&self.header, data))
            }
            _ => Err(Error::NotThreeD {
                image: self.describe(),
                shape: self.data.shape().to_vec(),
            }),
        }
    }

    /// 简短描述, 用于日志和错误信息.
    pub fn describe(&self) -> String {
        format!("NeuroImage(shape={:?})", self.data.shape())
    }

    /// 将图像裁剪到 `ranges` 给出的前若干维范围, 并相应地平移仿射矩阵原点.
    ///
    /// `ranges` 少于图像维数时, 其余维度保持不变. 越界的范围会被截断到图像内.
    pub fn crop_to(&self, ranges: &[Range<usize>]) -> Self {
        let ranges: Vec<Range<usize>> = ranges
            .iter()
            .zip(self.data.shape())
            .map(|(r, &len)| {
                let start = r.start.min(len);
                start..r.end.clamp(start, len)
            })
            .collect();
        let cropped = self.data.slice_each_axis(|ax| match ranges.get(ax.axis.index()) {
            Some(r) => Slice::from(r.clone()),
            None => Slice::from(..),
        });

        let old = self.affine();
        let mut new_affine = Array2::<f64>::eye(4);
        for i in 0..3 {
            let mut origin = old[[i, 3]];
            for j in 0..3 {
                new_affine[[i, j]] = old[[i, j]];
                let start = ranges.get(j).map_or(0, |r| r.start) as f64;
                origin += old[[i, j]] * start;
            }
            new_affine[[i, 3]] = origin;
        }

        let mut ans = Self::from_parts(&self.header, cropped.to_owned());
        affine::write_to_header(&mut ans.header, new_affine.view());
        ans
    }

    /// 尽可能裁剪图像, 去掉零值 (绝对值不超过 `rtol` 倍最大绝对值) 的外围,
    /// 并保留一个体素的零填充. 4D 图像按任意时间点非零计算.
    ///
    /// 若不存在非零体素, 返回原图像的拷贝.
    pub fn crop(&self, rtol: f64) -> Self {
        let inf_norm = self.data.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let limit = rtol * inf_norm;

        let spatial = self.data.ndim().min(3);
        let mut start = vec![usize::MAX; spatial];
        let mut end = vec![0usize; spatial];
        for (pos, v) in self.data.indexed_iter() {
            if !(*v < -limit || *v > limit) {
                continue;
            }
            for d in 0..spatial {
                start[d] = start[d].min(pos[d]);
                end[d] = end[d].max(pos[d] + 1);
            }
        }
        if start.iter().any(|s| *s == usize::MAX) {
            log::warn!("Nothing to crop in {}.", self.describe());
            return self.clone();
        }

        let shape = self.data.shape();
        let ranges: Vec<Range<usize>> = (0..spatial)
            .map(|d| start[d].saturating_sub(1)..(end[d] + 1).min(shape[d]))
            .collect();
        self.crop_to(&ranges)
    }
}

/// 图像访问接口: 既可以是文件路径, 也可以是已经加载的图像.
///
/// 对路径来说, [`ImageLike::load_header`] 只读取文件头而不解码体素数据,
/// 因此可以在真正读取数据之前完成元数据检查.
pub trait ImageLike {
    /// 读取 header.
    fn load_header(&self) -> Result<Cow<'_, NiftiHeader>>;

    /// 读取完整图像.
    fn load_image(&self) -> Result<Cow<'_, NeuroImage>>;

    /// 简短描述, 用于日志和错误信息.
    fn describe(&self) -> String;
}

impl ImageLike for Path {
    fn load_header(&self) -> Result<Cow<'_, NiftiHeader>> {
        if !self.exists() {
            return Err(Error::FileNotFound(self.to_owned()));
        }
        Ok(Cow::Owned(NiftiHeader::from_file(self)?))
    }

    fn load_image(&self) -> Result<Cow<'_, NeuroImage>> {
        NeuroImage::open(self).map(Cow::Owned)
    }

    fn describe(&self) -> String {
        self.display().to_string()
    }
}

macro_rules! impl_image_like_as_path {
    ($($t: ty),+) => {
        $(
            impl ImageLike for $t {
                #[inline]
                fn load_header(&self) -> Result<Cow<'_, NiftiHeader>> {
                    Path::new(self).load_header()
                }

                #[inline]
                fn load_image(&self) -> Result<Cow<'_, NeuroImage>> {
                    Path::new(self).load_image()
                }

                #[inline]
                fn describe(&self) -> String {
                    Path::new(self).describe()
                }
            }
        )+
    };
}

impl_image_like_as_path!(PathBuf, str, String);

impl ImageLike for NeuroImage {
    #[inline]
    fn load_header(&self) -> Result<Cow<'_, NiftiHeader>> {
        Ok(Cow::Borrowed(&self.header))
    }

    #[inline]
    fn load_image(&self) -> Result<Cow<'_, NeuroImage>> {
        Ok(Cow::Borrowed(self))
    }

    #[inline]
    fn describe(&self) -> String {
        NeuroImage::describe(self)
    }
}

impl<T: ImageLike + ?Sized> ImageLike for &T {
    #[inline]
    fn load_header(&self) -> Result<Cow<'_, NiftiHeader>> {
        (**self).load_header()
    }

    #[inline]
    fn load_image(&self) -> Result<Cow<'_, NeuroImage>> {
        (**self).load_image()
    }

    #[inline]
    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 读取图像, 失败时记录日志.
pub fn check_img<I: ImageLike + ?Sized>(image: &I) -> Result<Cow<'_, NeuroImage>> {
    image.load_image().map_err(|e| {
        log::error!("Error reading file {}: {e}", image.describe());
        e
    })
}

/// 获取图像的 header 和仿射矩阵.
pub fn get_img_info<I: ImageLike + ?Sized>(image: &I) -> Result<(NiftiHeader, Array2<f64>)> {
    let header = image.load_header().map_err(|e| {
        log::error!("Error reading file {}: {e}", image.describe());
        e
    })?;
    let affine = affine::from_header(&header);
    Ok((header.into_owned(), affine))
}

/// 获取图像体素数据的拷贝.
pub fn get_img_data<I: ImageLike + ?Sized>(image: &I) -> Result<ArrayD<f64>> {
    Ok(check_img(image)?.into_owned().into_data())
}

/// 创建给定形状的全零图像, 仿射矩阵为单位阵. 主要用于测试.
pub fn zeros(shape: &[usize]) -> NeuroImage {
    NeuroImage::new(ArrayD::zeros(IxDyn(shape)), Array2::eye(4).view())
}
