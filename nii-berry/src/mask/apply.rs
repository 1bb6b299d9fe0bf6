//! 将掩膜应用到 3D/4D 图像上, 以及把掩膜提取结果散射回完整形状.

use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ErrorKind, Ix3, Ix4, ShapeError};
use num::Zero;

use super::load_mask;
use crate::data::{check::check_img_compatibility, check_img, ImageLike};
use crate::error::Result;
use crate::Idx3d;

/// 一次掩膜提取的完整结果, 足以在之后恢复出完整形状的数据.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaskedData {
    /// 掩膜内的体素值, 按行优先序排列.
    pub values: Array1<f64>,

    /// 与 `values` 一一对应的体素下标.
    pub indices: Vec<Idx3d>,

    /// 原始 3D 形状.
    pub shape: Idx3d,
}

impl MaskedData {
    /// 对 `image` 应用 `mask` 并记录原始形状. 参见 [`apply_mask`].
    pub fn extract<I, M>(image: &I, mask: &M) -> Result<Self>
    where
        I: ImageLike + ?Sized,
        M: ImageLike + ?Sized,
    {
        let (values, indices) = apply_mask(image, mask)?;
        let header = mask.load_header()?;
        let [_, x, y, z, ..] = header.dim;
        Ok(Self {
            values,
            indices,
            shape: (x as usize, y as usize, z as usize),
        })
    }

    /// 恢复出完整形状的数据, 掩膜外的体素为 0.
    pub fn unmask(&self) -> Result<Array3<f64>> {
        unmask(self.values.view(), &self.indices, self.shape)
    }
}

/// 提取 3D 图像 `image` 中位于掩膜 `mask_img` 内的体素.
///
/// 先只读取 header 检查两者是否兼容, 再读取数据并校验掩膜.
///
/// # 返回值
///
/// `(掩膜内体素值, 体素下标)`, 均按行优先序排列.
pub fn apply_mask<I, M>(image: &I, mask_img: &M) -> Result<(Array1<f64>, Vec<Idx3d>)>
where
    I: ImageLike + ?Sized,
    M: ImageLike + ?Sized,
{
    check_img_compatibility(image, mask_img, false).map_err(|e| {
        log::error!(
            "Images {} and {} are not compatible.",
            image.describe(),
            mask_img.describe()
        );
        e
    })?;

    let apply = || -> Result<(Array1<f64>, Vec<Idx3d>)> {
        let vol = check_img(image)?
            .into_owned()
            .into_3d()?
            .into_data()
            .into_dimensionality::<Ix3>()?;
        let indices = load_mask(mask_img, true)?.indices();
        let values = indices.iter().map(|p| vol[*p]).collect();
        Ok((values, indices))
    };
    apply().map_err(|e| {
        log::error!(
            "Error applying mask {} to {}: {e}",
            mask_img.describe(),
            image.describe()
        );
        e
    })
}

/// 提取 4D 图像 `image` 中位于 3D 掩膜 `mask_img` 内的时间序列.
/// 掩膜沿最后一个轴广播. 只检查前三个空间维度是否兼容.
///
/// 3D 图像被视为只有一个时间点.
///
/// # 返回值
///
/// `(序列矩阵, 体素下标, 图像形状)`. 序列矩阵形状为 `(体素个数, 时间点个数)`.
pub fn apply_mask_4d<I, M>(image: &I, mask_img: &M) -> Result<(Array2<f64>, Vec<Idx3d>, Vec<usize>)>
where
    I: ImageLike + ?Sized,
    M: ImageLike + ?Sized,
{
    check_img_compatibility(image, mask_img, true).map_err(|e| {
        log::error!(
            "Images {} and {} are not compatible.",
            image.describe(),
            mask_img.describe()
        );
        e
    })?;

    let apply = || -> Result<(Array2<f64>, Vec<Idx3d>, Vec<usize>)> {
        let img = check_img(image)?;
        let shape = img.data().shape().to_vec();
        let vol = match shape.len() {
            3 => img.data().insert_axis(ndarray::Axis(3)).into_dimensionality::<Ix4>()?,
            _ => img.data().into_dimensionality::<Ix4>()?,
        };
        let indices = load_mask(mask_img, true)?.indices();

        let mut series = Array2::<f64>::zeros((indices.len(), vol.len_of(ndarray::Axis(3))));
        for (mut row, &(x, y, z)) in series.outer_iter_mut().zip(indices.iter()) {
            row.assign(&vol.slice(ndarray::s![x, y, z, ..]));
        }
        Ok((series, indices, shape))
    };
    apply().map_err(|e| {
        log::error!(
            "Error applying mask {} to {}: {e}",
            mask_img.describe(),
            image.describe()
        );
        e
    })
}

/// 将掩膜提取结果 `values` 按 `indices` 散射回形状为 `shape` 的 3D 数组,
/// 掩膜外填充零.
///
/// `values` 与 `indices` 长度不一致, 或下标越界时返回 `Err`.
pub fn unmask<T: Clone + Zero>(values: ArrayView1<T>, indices: &[Idx3d], shape: Idx3d) -> Result<Array3<T>> {
    if values.len() != indices.len() {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }
    let mut ans = Array3::<T>::zeros(shape);
    for (v, pos) in values.iter().zip(indices) {
        let slot = ans
            .get_mut(*pos)
            .ok_or_else(|| ShapeError::from_kind(ErrorKind::OutOfBounds))?;
        *slot = v.clone();
    }
    Ok(ans)
}

/// 与 [`unmask`] 类似, 但散射的是 `(体素个数, 时间点个数)` 形状的序列矩阵.
/// `shape` 必须是 4D 形状, 且最后一维等于时间点个数.
pub fn unmask_4d<T: Clone + Zero>(series: ArrayView2<T>, indices: &[Idx3d], shape: &[usize]) -> Result<Array4<T>> {
    let &[x, y, z, t] = shape else {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    };
    if series.nrows() != indices.len() || series.ncols() != t {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }
    let mut ans = Array4::<T>::zeros((x, y, z, t));
    for (row, &(i, j, k)) in series.outer_iter().zip(indices) {
        if i >= x || j >= y || k >= z {
            return Err(ShapeError::from_kind(ErrorKind::OutOfBounds).into());
        }
        ans.slice_mut(ndarray::s![i, j, k, ..]).assign(&row);
    }
    Ok(ans)
}
