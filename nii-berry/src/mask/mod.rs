//! 掩膜的加载, 校验与生成.
//!
//! 合法掩膜只包含一个或两个不同的原始值; 有两个值时, 其中一个必须是背景值 `0`.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;

use itertools::Itertools;
use ndarray::{Array2, Array3, ArrayD, ArrayView3, Ix3};
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use ordered_float::OrderedFloat;

use crate::consts::MASK_BACKGROUND;
use crate::data::{check::check_img_compatibility, check_img, ImageLike, NeuroImage, NiftiHeaderAttr};
use crate::error::{Error, Result};
use crate::Idx3d;

pub mod apply;

pub use apply::{apply_mask, apply_mask_4d, unmask, unmask_4d, MaskedData};

/// 掩膜校验时最多收集的不同取值个数. 超过两个即可判定非法.
const MAX_COLLECTED_VALUES: usize = 3;

/// 3D 布尔掩膜, 包括 header 和数据. `true` 代表前景.
#[derive(Debug, Clone)]
pub struct Mask {
    header: Box<NiftiHeader>,
    data: Array3<bool>,
}

impl NiftiHeaderAttr for Mask {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Mask {
    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 取出数据.
    #[inline]
    pub fn into_data(self) -> Array3<bool> {
        self.data
    }

    /// 3D 形状.
    #[inline]
    pub fn dim(&self) -> Idx3d {
        self.data.dim()
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 收集所有前景体素对应的下标, 结果按行优先存储.
    pub fn indices(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| p.then_some(pos))
            .collect()
    }

    /// 转换为体素值为 0/1 的普通图像.
    pub fn to_image(&self) -> NeuroImage {
        let data = self.data.mapv(|p| if p { 1.0 } else { 0.0 }).into_dyn();
        NeuroImage::from_parts(&self.header, data)
    }

    /// 以 `u8` 体素的 nifti 格式保存到 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = self.data.mapv(u8::from);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)?;
        Ok(())
    }
}

impl ImageLike for Mask {
    #[inline]
    fn load_header(&self) -> Result<Cow<'_, NiftiHeader>> {
        Ok(Cow::Borrowed(&self.header))
    }

    #[inline]
    fn load_image(&self) -> Result<Cow<'_, NeuroImage>> {
        Ok(Cow::Owned(self.to_image()))
    }

    fn describe(&self) -> String {
        format!("Mask(shape={:?}, count={})", self.data.shape(), self.count())
    }
}

/// 校验 `values` 是否能被解释为掩膜.
///
/// # 返回值
///
/// - 只有一个取值: 非零时合法; 为零时仅当 `allow_empty` 为 `true` 合法,
///   否则返回 `Err(Error::EmptyMask)`;
/// - 两个取值: 其中之一必须为零, 否则返回 `Err(Error::InvalidMask)`;
/// - 其他情况返回 `Err(Error::InvalidMask)`.
pub fn validate_mask_values<'a, I>(values: I, allow_empty: bool) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut uniq = BTreeSet::new();
    for v in values {
        uniq.insert(OrderedFloat(*v));
        if uniq.len() >= MAX_COLLECTED_VALUES {
            break;
        }
    }
    let background = OrderedFloat(MASK_BACKGROUND);

    match uniq.len() {
        0 => Err(Error::InvalidMask("given mask contains no voxels".into())),
        1 if uniq.contains(&background) && !allow_empty => Err(Error::EmptyMask),
        1 => Ok(()),
        2 if !uniq.contains(&background) => Err(Error::InvalidMask(format!(
            "background of the mask must be represented with 0, given mask contains: [{}]",
            uniq.iter().join(", ")
        ))),
        2 => Ok(()),
        _ => Err(Error::InvalidMask(format!(
            "given mask is not made of 2 values: [{}, ...], cannot interpret as true or false",
            uniq.iter().join(", ")
        ))),
    }
}

/// 加载掩膜. `image` 会先被压缩为 3D, 再校验取值.
///
/// `allow_empty` 决定是否允许全为背景的掩膜.
pub fn load_mask<I: ImageLike + ?Sized>(image: &I, allow_empty: bool) -> Result<Mask> {
    let load = || -> Result<Mask> {
        let img = check_img(image)?.into_owned().into_3d()?;
        validate_mask_values(img.data().iter(), allow_empty)?;
        let data = img
            .data()
            .mapv(|v| v != MASK_BACKGROUND)
            .into_dimensionality::<Ix3>()?;
        let header = Box::new(img.header().clone());
        Ok(Mask { header, data })
    };
    load().map_err(|e| {
        log::error!("Error reading mask {}: {e}", image.describe());
        e
    })
}

/// 加载掩膜, 返回布尔数据和仿射矩阵.
pub fn load_mask_data<I: ImageLike + ?Sized>(
    image: &I,
    allow_empty: bool,
) -> Result<(Array3<bool>, Array2<f64>)> {
    let mask = load_mask(image, allow_empty)?;
    let affine = mask.affine();
    Ok((mask.into_data(), affine))
}

/// 以 `threshold` 二值化图像: 严格大于阈值的体素为 `true`.
pub fn binarise<I: ImageLike + ?Sized>(image: &I, threshold: f64) -> Result<ArrayD<bool>> {
    let img = check_img(image).map_err(|e| {
        log::error!("Error creating mask from file {}.", image.describe());
        e
    })?;
    Ok(img.data().mapv(|v| v > threshold))
}

/// 以 `files` 中所有图像的并集创建二值掩膜.
///
/// 每幅图像都必须与第一幅图像兼容. 体素值之和大于零的位置为 `true`.
pub fn union_mask<P: ImageLike>(files: &[P]) -> Result<ArrayD<bool>> {
    let first = files.first().ok_or(Error::EmptyFileList)?;
    let mut acc = check_img(first)?.into_owned().into_data();

    for other in files.iter().skip(1) {
        let joined = check_img_compatibility(first, other, false)
            .and_then(|_| check_img(other).map(|img| acc += &img.data()));
        if let Err(e) = joined {
            log::error!(
                "Error joining mask {} and {}: {e}",
                first.describe(),
                other.describe()
            );
            return Err(e);
        }
    }
    Ok(acc.mapv(|v| v > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    fn image_of(data: Array3<f64>) -> NeuroImage {
        NeuroImage::new(data.into_dyn(), Array2::eye(4).view())
    }

    #[test]
    fn test_validate_two_values_with_background() {
        let a = arr2(&[[0.0, 0.0], [0.0, 1.0]]);
        assert!(validate_mask_values(a.iter(), false).is_ok());
    }

    #[test]
    fn test_validate_too_many_values() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let err = validate_mask_values(a.iter(), true).unwrap_err();
        assert!(matches!(err, Error::InvalidMask(_)));
    }

    #[test]
    fn test_validate_two_values_without_background() {
        let a = arr2(&[[1.0, 2.0], [1.0, 2.0]]);
        assert!(matches!(
            validate_mask_values(a.iter(), true),
            Err(Error::InvalidMask(_))
        ));
    }

    #[test]
    fn test_validate_single_value() {
        let ones = [1.0; 8];
        assert!(validate_mask_values(ones.iter(), false).is_ok());

        let zeros = [0.0; 8];
        assert!(validate_mask_values(zeros.iter(), true).is_ok());
        assert!(matches!(
            validate_mask_values(zeros.iter(), false),
            Err(Error::EmptyMask)
        ));
    }

    #[test]
    fn test_validate_negative_zero_is_background() {
        let a = [-0.0, 5.0, 0.0];
        assert!(validate_mask_values(a.iter(), false).is_ok());
    }

    #[test]
    fn test_load_mask_single_region() {
        let mut data = Array3::<f64>::zeros((4, 4, 4));
        data.slice_mut(ndarray::s![1..3, 1..3, 1..3]).fill(7.0);
        let mask = load_mask(&image_of(data), false).unwrap();
        assert_eq!(mask.count(), 8);
        assert_eq!(mask.dim(), (4, 4, 4));
        assert_eq!(mask.indices()[0], (1, 1, 1));
        assert_eq!(*mask.indices().last().unwrap(), (2, 2, 2));
    }

    #[test]
    fn test_load_mask_squeezes_4d() {
        let mut data = ndarray::Array4::<f64>::zeros((3, 3, 3, 1));
        data[[0, 1, 2, 0]] = 1.0;
        let img = NeuroImage::new(data.into_dyn(), Array2::eye(4).view());
        let (mask, affine) = load_mask_data(&img, false).unwrap();
        assert_eq!(mask.dim(), (3, 3, 3));
        assert!(mask[[0, 1, 2]]);
        assert_eq!(affine, Array2::<f64>::eye(4));
    }

    #[test]
    fn test_load_mask_rejects_labels() {
        let mut data = Array3::<f64>::zeros((3, 3, 3));
        data[[0, 0, 0]] = 1.0;
        data[[1, 1, 1]] = 2.0;
        assert!(matches!(
            load_mask(&image_of(data), true),
            Err(Error::InvalidMask(_))
        ));
    }

    #[test]
    fn test_binarise() {
        let data = Array3::from_shape_vec((1, 2, 2), vec![0.1, 0.5, 0.9, -1.0]).unwrap();
        let b = binarise(&image_of(data), 0.5).unwrap();
        assert_eq!(
            b.iter().copied().collect::<Vec<_>>(),
            vec![false, false, true, false]
        );
    }

    #[test]
    fn test_union_mask() {
        let mut a = Array3::<f64>::zeros((2, 2, 2));
        a[[0, 0, 0]] = 1.0;
        let mut b = Array3::<f64>::zeros((2, 2, 2));
        b[[1, 1, 1]] = 1.0;
        let u = union_mask(&[image_of(a), image_of(b)]).unwrap();
        assert_eq!(u.iter().filter(|p| **p).count(), 2);
        assert!(u[[0, 0, 0].as_slice()]);
        assert!(u[[1, 1, 1].as_slice()]);
    }

    #[test]
    fn test_union_mask_incompatible() {
        let a = image_of(Array3::zeros((2, 2, 2)));
        let b = image_of(Array3::zeros((2, 2, 3)));
        assert!(matches!(
            union_mask(&[a, b]),
            Err(Error::NotCompatible { .. })
        ));
        assert!(matches!(
            union_mask::<NeuroImage>(&[]),
            Err(Error::EmptyFileList)
        ));
    }

    #[test]
    fn test_mask_as_image_like() {
        let mut data = Array3::<f64>::zeros((2, 2, 2));
        data[[1, 0, 1]] = 1.0;
        let mask = load_mask(&image_of(data), false).unwrap();
        let reloaded = load_mask(&mask, false).unwrap();
        assert_eq!(reloaded.indices(), vec![(1, 0, 1)]);
        assert_eq!(mask.describe(), "Mask(shape=[2, 2, 2], count=1)");
    }
}
