//! 两幅图像的兼容性检查.
//!
//! 所有检查只读取 header, 不会解码任何体素数据.

use super::{affine, get_shape_from_header, ImageLike};
use crate::error::{Error, Result};

/// 仿射矩阵比较的相对容差.
const AFFINE_RTOL: f64 = 1e-5;

/// 仿射矩阵比较的绝对容差.
const AFFINE_ATOL: f64 = 1e-8;

/// 比较两个形状. 若给出 `nd_to_check`, 则只比较前 `nd_to_check` 维.
pub fn have_same_shape(one: &[usize], another: &[usize], nd_to_check: Option<usize>) -> bool {
    match nd_to_check {
        Some(n) => one.iter().take(n).eq(another.iter().take(n)),
        None => one == another,
    }
}

/// 两幅图像的仿射矩阵是否在容差范围内相等.
pub fn have_same_affine<A, B>(one: &A, another: &B) -> Result<bool>
where
    A: ImageLike + ?Sized,
    B: ImageLike + ?Sized,
{
    let a = affine::from_header(&*one.load_header()?);
    let b = affine::from_header(&*another.load_header()?);
    Ok(affine::allclose(a.view(), b.view(), AFFINE_RTOL, AFFINE_ATOL))
}

/// 检查两幅图像形状与仿射矩阵是否一致, 不一致时返回
/// `Err(Error::NotCompatible)`.
///
/// `only_check_3d` 为 `true` 时只比较前三个空间维度的形状.
pub fn check_img_compatibility<A, B>(one: &A, another: &B, only_check_3d: bool) -> Result<()>
where
    A: ImageLike + ?Sized,
    B: ImageLike + ?Sized,
{
    let not_compatible = |reason: String| Error::NotCompatible {
        one: one.describe(),
        another: another.describe(),
        reason,
    };

    let one_header = one.load_header()?;
    let another_header = another.load_header()?;

    let one_shape = get_shape_from_header(&one_header);
    let another_shape = get_shape_from_header(&another_header);
    let nd_to_check = only_check_3d.then_some(3);
    if !have_same_shape(&one_shape, &another_shape, nd_to_check) {
        return Err(not_compatible(format!(
            "shape {one_shape:?} != {another_shape:?}"
        )));
    }

    let a = affine::from_header(&one_header);
    let b = affine::from_header(&another_header);
    if !affine::allclose(a.view(), b.view(), AFFINE_RTOL, AFFINE_ATOL) {
        return Err(not_compatible(format!("affine {a:?} != {b:?}")));
    }
    Ok(())
}

/// 与 [`check_img_compatibility`] 相同, 但以 `bool` 形式返回结果.
/// 读取 header 失败也视为不兼容.
pub fn are_compatible_imgs<A, B>(one: &A, another: &B) -> bool
where
    A: ImageLike + ?Sized,
    B: ImageLike + ?Sized,
{
    check_img_compatibility(one, another, false).is_ok()
}
