//! 通用 nifti 图像加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use std::path::{Path, PathBuf};

use crate::data::NeuroImage;
use crate::error::Result;

/// 从文件列表创建图像加载器. 加载器按给定顺序逐个打开文件.
///
/// # 注意
///
/// 文件不存在或无法解码时, 加载器在迭代时会返回 `Result::Err`, 不会中止迭代.
pub fn image_loader<I, P>(files: I) -> ImageLoader
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut data: Vec<(usize, PathBuf)> = files
        .into_iter()
        .enumerate()
        .map(|(i, p)| (i, p.as_ref().to_owned()))
        .collect();
    data.reverse();

    ImageLoader { data_rev: data }
}

/// 3D/4D nifti 图像加载器. 迭代项为 `(文件在列表中的位置, 图像)`.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    data_rev: Vec<(usize, PathBuf)>,
}

impl ImageLoader {
    /// 在 `dir` 目录下, 为每个 `names` 元素创建加载器.
    pub fn in_dir<I, S>(dir: impl AsRef<Path>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let dir = dir.as_ref();
        image_loader(names.into_iter().map(|n| dir.join(n)))
    }
}

impl Iterator for ImageLoader {
    type Item = (usize, Result<NeuroImage>);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, path) = self.data_rev.pop()?;
        let data = NeuroImage::open(&path).map_err(|e| {
            log::error!("Error reading file {}: {e}", path.display());
            e
        });
        Some((idx, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.data_rev.len(), Some(self.data_rev.len()))
    }
}

impl ExactSizeIterator for ImageLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_loader_order_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let img = NeuroImage::new(Array3::<f64>::ones((2, 2, 2)).into_dyn(), Array2::eye(4).view());
        img.save(dir.path().join("a.nii")).unwrap();

        let mut loader = ImageLoader::in_dir(dir.path(), ["a.nii", "missing.nii", "a.nii"]);
        assert_eq!(loader.len(), 3);

        let (i, first) = loader.next().unwrap();
        assert_eq!(i, 0);
        assert_eq!(first.unwrap().data().shape(), &[2, 2, 2]);

        let (i, second) = loader.next().unwrap();
        assert_eq!(i, 1);
        assert!(matches!(second, Err(Error::FileNotFound(_))));

        assert_eq!(loader.len(), 1);
        assert_eq!(loader.next().map(|(i, _)| i), Some(2));
        assert!(loader.next().is_none());
    }
}
