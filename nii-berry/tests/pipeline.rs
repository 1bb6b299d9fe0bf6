use std::path::{Path, PathBuf};

use ndarray::{arr2, Array2, Array3, Array4};
use nii_berry::prelude::*;
use nii_berry::storage::{mat, NpzArchive};

fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

fn affine() -> Array2<f64> {
    arr2(&[
        [2.0, 0.0, 0.0, -10.0],
        [0.0, 2.0, 0.0, -20.0],
        [0.0, 0.0, 2.0, 4.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

fn write(dir: &Path, name: &str, data: Array3<f64>) -> PathBuf {
    let path = dir.join(name);
    NeuroImage::new(data.into_dyn(), affine().view()).save(&path).unwrap();
    path
}

fn volume(seed: f64) -> Array3<f64> {
    Array3::from_shape_fn((3, 4, 5), |(x, y, z)| seed + (x * 20 + y * 5 + z) as f64)
}

fn mask_data() -> Array3<f64> {
    let mut m = Array3::zeros((3, 4, 5));
    m[[0, 1, 2]] = 1.0;
    m[[1, 0, 0]] = 1.0;
    m[[2, 3, 4]] = 1.0;
    m
}

#[test]
fn test_stack_files_on_disk() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = (0..3)
        .map(|i| write(dir.path(), &format!("s{i}.nii"), volume(100.0 * i as f64)))
        .collect();
    let mask = write(dir.path(), "mask.nii", mask_data());

    let (m, indices, shape) = niftilist_mask_to_array::<f64, _, _>(&files, &mask).unwrap();
    assert_eq!(shape, (3, 4, 5));
    assert_eq!(indices, vec![(0, 1, 2), (1, 0, 0), (2, 3, 4)]);
    assert_eq!(m.dim(), (3, 3));
    assert_eq!(m.row(0).to_vec(), vec![7.0, 20.0, 59.0]);
    assert_eq!(m.row(2).to_vec(), vec![207.0, 220.0, 259.0]);

    let (full, full_shape) = niftilist_to_array::<f32, _>(&files).unwrap();
    assert_eq!(full_shape, vec![3, 4, 5]);
    assert_eq!(full.dim(), (3, 60));
    assert_eq!(full[[1, 59]], 159.0);
}

#[test]
fn test_mask_apply_and_unmask() {
    let dir = tempfile::tempdir().unwrap();
    let img = write(dir.path(), "img.nii.gz", volume(1.0));
    let mask = write(dir.path(), "mask.nii.gz", mask_data());

    let m = load_mask(&mask, false).unwrap();
    assert_eq!(m.count(), 3);

    let (values, indices) = apply_mask(&img, &mask).unwrap();
    assert_eq!(values.to_vec(), vec![8.0, 21.0, 60.0]);

    let back = unmask(values.view(), &indices, (3, 4, 5)).unwrap();
    assert_eq!(back[[2, 3, 4]], 60.0);
    assert_eq!(back.iter().filter(|v| **v != 0.0).count(), 3);
}

#[test]
fn test_apply_mask_4d_series() {
    let dir = tempfile::tempdir().unwrap();
    let series = Array4::from_shape_fn((3, 4, 5, 2), |(x, y, z, t)| (x * 20 + y * 5 + z) as f64 + 1000.0 * t as f64);
    let path = dir.path().join("series.nii");
    NeuroImage::new(series.into_dyn(), affine().view()).save(&path).unwrap();
    let mask = write(dir.path(), "mask.nii", mask_data());

    let (m, indices, shape) = apply_mask_4d(&path, &mask).unwrap();
    assert_eq!(shape, vec![3, 4, 5, 2]);
    assert_eq!(m.dim(), (3, 2));
    assert_eq!(m.row(1).to_vec(), vec![20.0, 1020.0]);

    let back = unmask_4d(m.view(), &indices, &shape).unwrap();
    assert_eq!(back[[0, 1, 2, 1]], 1007.0);
}

#[test]
fn test_incompatible_image_is_rejected() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mask = write(dir.path(), "mask.nii", mask_data());
    let moved = dir.path().join("moved.nii");
    let mut shifted = affine();
    shifted[[0, 3]] += 5.0;
    NeuroImage::new(volume(0.0).into_dyn(), shifted.view())
        .save(&moved)
        .unwrap();
    let small = write(dir.path(), "small.nii", Array3::zeros((3, 4, 4)));

    assert!(!are_compatible_imgs(&moved, &mask));
    assert!(matches!(apply_mask(&small, &mask), Err(Error::NotCompatible { .. })));
    assert!(matches!(
        niftilist_mask_to_array::<f64, _, _>(&[moved], &mask),
        Err(Error::NotCompatible { .. })
    ));
}

#[test]
fn test_invalid_masks() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let empty = write(dir.path(), "empty.nii", Array3::zeros((3, 4, 5)));
    let mut three = mask_data();
    three[[0, 0, 0]] = 2.0;
    let three = write(dir.path(), "three.nii", three);

    assert!(matches!(load_mask(&empty, false), Err(Error::EmptyMask)));
    assert_eq!(load_mask(&empty, true).unwrap().count(), 0);
    assert!(matches!(load_mask(&three, false), Err(Error::InvalidMask(_))));
    assert!(matches!(load_mask(&dir.path().join("none.nii"), false), Err(Error::FileNotFound(_))));
}

#[test]
fn test_export_stacked_data() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let files = vec![write(dir.path(), "a.nii", volume(0.0)), write(dir.path(), "b.nii", volume(1.0))];
    let mask = write(dir.path(), "mask.nii", mask_data());
    let (m, indices, shape) = niftilist_mask_to_array::<f32, _, _>(&files, &mask).unwrap();

    let names = ["data", "mask_indices", "vol_shape"];
    let values = vec![
        Variable::from(m.clone()),
        Variable::from_indices(&indices),
        Variable::from_shape(&[shape.0, shape.1, shape.2]),
    ];

    let npz = ExportData::save_varlist(dir.path().join("out.npz"), &names, values.clone())
        .unwrap()
        .unwrap();
    let mut archive = NpzArchive::new(&npz).unwrap();
    assert_eq!(archive.len(), 3);
    assert_eq!(archive.by_name("data").unwrap(), Variable::from(m));
    assert_eq!(archive.by_name("vol_shape").unwrap(), Variable::from_shape(&[3, 4, 5]));

    let matfile = ExportData::save_varlist(dir.path().join("out.MAT"), &names, values)
        .unwrap()
        .unwrap();
    assert_eq!(mat::load_varnames_from_mat(&matfile).unwrap(), names);
}

#[test]
fn test_binarise_and_union() {
    let dir = tempfile::tempdir().unwrap();
    let img = write(dir.path(), "img.nii", volume(0.0));
    let b = binarise(&img, 50.0).unwrap();
    assert_eq!(b.iter().filter(|p| **p).count(), 9);

    let other = write(dir.path(), "other.nii", mask_data());
    let u = union_mask(&[other.clone(), other]).unwrap();
    assert_eq!(u.iter().filter(|p| **p).count(), 3);
}
