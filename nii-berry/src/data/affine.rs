//! 从 nifti header 推导体素索引到物理空间的 4x4 仿射矩阵.

use ndarray::{arr2, Array2, ArrayView2};
use nifti::NiftiHeader;

/// 按 sform -> qform -> 基础仿射矩阵的优先级获取最佳仿射矩阵.
pub fn from_header(h: &NiftiHeader) -> Array2<f64> {
    if h.sform_code > 0 {
        sform(h)
    } else if h.qform_code > 0 {
        qform(h)
    } else {
        base(h)
    }
}

/// 直接由 `srow_{x, y, z}` 组成的仿射矩阵.
fn sform(h: &NiftiHeader) -> Array2<f64> {
    let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
    arr2(&[
        row(&h.srow_x),
        row(&h.srow_y),
        row(&h.srow_z),
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// 由四元数 `(b, c, d)`, 体素尺寸和 `qfac` 组成的仿射矩阵.
fn qform(h: &NiftiHeader) -> Array2<f64> {
    let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
    // 单精度存储带来的微小负值按 0 处理.
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let [_, dx, dy, dz, ..] = h.pixdim;
    let (dx, dy, dz) = (dx as f64, dy as f64, dz as f64 * qfac);

    let r = [
        [
            a * a + b * b - c * c - d * d,
            2.0 * (b * c - a * d),
            2.0 * (b * d + a * c),
        ],
        [
            2.0 * (b * c + a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d - a * b),
        ],
        [
            2.0 * (b * d - a * c),
            2.0 * (c * d + a * b),
            a * a + d * d - c * c - b * b,
        ],
    ];
    let offset = [
        h.quatern_x as f64,
        h.quatern_y as f64,
        h.quatern_z as f64,
    ];

    let mut ans = Array2::<f64>::eye(4);
    for (i, row) in r.iter().enumerate() {
        ans[[i, 0]] = row[0] * dx;
        ans[[i, 1]] = row[1] * dy;
        ans[[i, 2]] = row[2] * dz;
        ans[[i, 3]] = offset[i];
    }
    ans
}

/// 没有任何方向信息时使用的仿射矩阵: 对角线为体素尺寸, 原点位于体数据中心.
fn base(h: &NiftiHeader) -> Array2<f64> {
    let mut ans = Array2::<f64>::eye(4);
    for i in 0..3 {
        let zoom = match h.pixdim[i + 1] as f64 {
            z if z == 0.0 => 1.0,
            z => z,
        };
        let len = (h.dim[i + 1] as f64).max(1.0);
        ans[[i, i]] = zoom;
        ans[[i, 3]] = -(len - 1.0) / 2.0 * zoom;
    }
    ans
}

/// 将 `affine` 写入 header 的 sform 部分, 并将体素尺寸同步到 `pixdim`.
pub(crate) fn write_to_header(h: &mut NiftiHeader, affine: ArrayView2<f64>) {
    let row = |r: usize| {
        [
            affine[[r, 0]] as f32,
            affine[[r, 1]] as f32,
            affine[[r, 2]] as f32,
            affine[[r, 3]] as f32,
        ]
    };
    h.srow_x = row(0);
    h.srow_y = row(1);
    h.srow_z = row(2);
    // NIFTI_XFORM_ALIGNED_ANAT
    h.sform_code = 2;
    h.qform_code = 0;
    for j in 0..3 {
        let zoom = (0..3).map(|i| affine[[i, j]].powi(2)).sum::<f64>().sqrt();
        h.pixdim[j + 1] = zoom as f32;
    }
}

/// 逐元素判断 `|a - b| <= atol + rtol * |b|`, 与 numpy 的 `allclose` 一致.
pub fn allclose(a: ArrayView2<f64>, b: ArrayView2<f64>, rtol: f64, atol: f64) -> bool {
    a.shape() == b.shape()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}
