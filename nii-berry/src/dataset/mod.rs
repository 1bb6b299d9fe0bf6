//! 数据集操作: 把一组同形状的图像堆叠为矩阵.

use ndarray::{Array2, ArrayViewMut1, Axis, Ix3};
use num::{NumCast, Zero};

use crate::data::check::{check_img_compatibility, have_same_shape};
use crate::data::{check_img, get_shape_from_header, ImageLike};
use crate::error::{Error, Result};
use crate::mask::load_mask;
use crate::Idx3d;

mod loader;

pub use loader::{image_loader, ImageLoader};

/// 将一个体素值转换为输出元素类型. 无法表示时返回 `Err(Error::Cast)`.
#[inline]
fn cast_voxel<T: NumCast>(value: f64, file: &dyn Fn() -> String) -> Result<T> {
    T::from(value).ok_or_else(|| Error::Cast {
        value,
        file: file(),
    })
}

/// 将 `values` 逐个转换后写入 `row`.
fn fill_row<'a, T, I>(mut row: ArrayViewMut1<T>, values: I, file: &dyn Fn() -> String) -> Result<()>
where
    T: NumCast,
    I: IntoIterator<Item = &'a f64>,
{
    for (slot, v) in row.iter_mut().zip(values) {
        *slot = cast_voxel(*v, file)?;
    }
    Ok(())
}

/// 将 `files` 中的每幅图像展平 (行优先) 为一行, 组成 `(文件个数, 体素个数)` 的矩阵.
///
/// 所有图像的形状必须与第一幅相同.
///
/// # 返回值
///
/// `(矩阵, 图像形状)`. 元素类型 `T` 由调用方决定, 体素值无法用 `T`
/// 表示时返回 `Err(Error::Cast)`.
///
/// # 注意
///
/// 任何一个文件出错都会中止整个操作, 并返回该错误.
pub fn niftilist_to_array<T, P>(files: &[P]) -> Result<(Array2<T>, Vec<usize>)>
where
    T: NumCast + Clone + Zero,
    P: ImageLike,
{
    let first = files.first().ok_or_else(|| {
        log::error!("Error getting the first item of an empty file list.");
        Error::EmptyFileList
    })?;
    let shape = get_shape_from_header(&*first.load_header()?);
    let size = shape.iter().product();

    let mut ans = Array2::<T>::zeros((files.len(), size));
    for (row, file) in ans.axis_iter_mut(Axis(0)).zip(files) {
        let fill = || -> Result<()> {
            let file_shape = get_shape_from_header(&*file.load_header()?);
            if !have_same_shape(&file_shape, &shape, None) {
                return Err(Error::NotCompatible {
                    one: first.describe(),
                    another: file.describe(),
                    reason: format!("shape {shape:?} != {file_shape:?}"),
                });
            }
            let img = check_img(file)?;
            fill_row(row, img.data().iter(), &|| file.describe())
        };
        fill().map_err(|e| {
            log::error!("Error on reading file {}: {e}", file.describe());
            e
        })?;
    }
    Ok((ans, shape))
}

/// 对 `files` 中的每幅 3D 图像应用掩膜 `mask`, 并将掩膜内体素逐行堆叠为
/// `(文件个数, 掩膜前景体素个数)` 的矩阵.
///
/// 读取每幅图像的数据之前, 都会先通过 header 检查它与掩膜是否兼容.
///
/// # 返回值
///
/// `(矩阵, 掩膜体素下标, 掩膜形状)`. 下标按行优先序排列, 与矩阵的列一一对应.
///
/// # 注意
///
/// 任何一个文件出错都会中止整个操作, 并返回该错误.
pub fn niftilist_mask_to_array<T, P, M>(files: &[P], mask: &M) -> Result<(Array2<T>, Vec<Idx3d>, Idx3d)>
where
    T: NumCast + Clone + Zero,
    P: ImageLike,
    M: ImageLike + ?Sized,
{
    if files.is_empty() {
        log::error!("Error getting the first item of an empty file list.");
        return Err(Error::EmptyFileList);
    }

    let mask = load_mask(mask, true)?;
    let indices = mask.indices();

    let mut ans = Array2::<T>::zeros((files.len(), indices.len()));
    for (row, file) in ans.axis_iter_mut(Axis(0)).zip(files) {
        let fill = || -> Result<()> {
            check_img_compatibility(file, &mask, false)?;
            let vol = check_img(file)?
                .into_owned()
                .into_3d()?
                .into_data()
                .into_dimensionality::<Ix3>()?;
            let values = indices.iter().map(|p| &vol[*p]);
            fill_row(row, values, &|| file.describe())
        };
        fill().map_err(|e| {
            log::error!("Error when reading file {}: {e}", file.describe());
            e
        })?;
    }
    Ok((ans, indices, mask.dim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NeuroImage;
    use ndarray::{Array2, Array3};

    fn image_of(data: Array3<f64>) -> NeuroImage {
        NeuroImage::new(data.into_dyn(), Array2::eye(4).view())
    }

    fn volume(seed: f64) -> NeuroImage {
        image_of(Array3::from_shape_fn((2, 3, 4), |(x, y, z)| {
            seed + (x * 12 + y * 4 + z) as f64
        }))
    }

    fn mask() -> NeuroImage {
        let mut m = Array3::<f64>::zeros((2, 3, 4));
        m[[0, 0, 0]] = 1.0;
        m[[0, 2, 1]] = 1.0;
        m[[1, 1, 3]] = 1.0;
        image_of(m)
    }

    #[test]
    fn test_niftilist_to_array() {
        let (m, shape) = niftilist_to_array::<f64, _>(&[volume(0.0), volume(100.0)]).unwrap();
        assert_eq!(shape, vec![2, 3, 4]);
        assert_eq!(m.dim(), (2, 24));
        assert_eq!(m[[0, 5]], 5.0);
        assert_eq!(m[[1, 23]], 123.0);
    }

    #[test]
    fn test_niftilist_to_array_shape_mismatch() {
        let other = image_of(Array3::zeros((2, 3, 5)));
        let err = niftilist_to_array::<f64, _>(&[volume(0.0), other]).unwrap_err();
        assert!(matches!(err, Error::NotCompatible { .. }));
    }

    #[test]
    fn test_niftilist_mask_to_array() {
        let files = [volume(0.0), volume(10.0), volume(20.0)];
        let (m, indices, shape) = niftilist_mask_to_array::<f32, _, _>(&files, &mask()).unwrap();
        assert_eq!(shape, (2, 3, 4));
        assert_eq!(indices, vec![(0, 0, 0), (0, 2, 1), (1, 1, 3)]);
        assert_eq!(m.dim(), (3, 3));
        assert_eq!(m.row(0).to_vec(), vec![0.0f32, 9.0, 19.0]);
        assert_eq!(m.row(2).to_vec(), vec![20.0f32, 29.0, 39.0]);
    }

    #[test]
    fn test_niftilist_mask_to_array_integer_output() {
        let (m, _, _) = niftilist_mask_to_array::<i16, _, _>(&[volume(1.0)], &mask()).unwrap();
        assert_eq!(m.row(0).to_vec(), vec![1i16, 10, 20]);
    }

    #[test]
    fn test_niftilist_mask_to_array_unrepresentable() {
        let mut data = Array3::<f64>::zeros((2, 3, 4));
        data[[0, 2, 1]] = f64::NAN;
        let err = niftilist_mask_to_array::<i32, _, _>(&[image_of(data)], &mask()).unwrap_err();
        assert!(matches!(err, Error::Cast { .. }));
    }

    #[test]
    fn test_niftilist_mask_to_array_aborts_on_incompatible() {
        let files = [volume(0.0), image_of(Array3::zeros((2, 3, 3)))];
        let err = niftilist_mask_to_array::<f64, _, _>(&files, &mask()).unwrap_err();
        assert!(matches!(err, Error::NotCompatible { .. }));

        let none: [NeuroImage; 0] = [];
        assert!(matches!(
            niftilist_mask_to_array::<f64, _, _>(&none, &mask()),
            Err(Error::EmptyFileList)
        ));
    }

    #[test]
    fn test_niftilist_mask_to_array_missing_file() {
        let files = ["/no/such/volume.nii.gz"];
        let err = niftilist_mask_to_array::<f64, _, _>(&files, &mask()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
