use ndarray::Array2;
use tempfile::TempDir;

use echelle_core::error::EchelleError;
use echelle_core::io::image_io::{load_counts, load_frame, save_counts};

fn ramp() -> Array2<f32> {
    Array2::from_shape_fn((12, 20), |(r, c)| (r * 1000 + c * 7) as f32)
}

#[test]
fn test_counts_survive_png() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frame.png");
    save_counts(&ramp(), &path).unwrap();
    assert_eq!(load_counts(&path).unwrap(), ramp());
}

#[test]
fn test_counts_survive_tiff() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frame.tiff");
    save_counts(&ramp(), &path).unwrap();
    assert_eq!(load_counts(&path).unwrap(), ramp());
}

#[test]
fn test_save_clamps_to_u16_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clamped.png");
    let data = Array2::from_shape_vec((1, 3), vec![-25.0, 12.6, 90_000.0]).unwrap();
    save_counts(&data, &path).unwrap();
    let back = load_counts(&path).unwrap();
    assert_eq!(back.iter().copied().collect::<Vec<_>>(), vec![0.0, 13.0, 65535.0]);
}

#[test]
fn test_frame_with_mask() {
    let dir = TempDir::new().unwrap();
    let data_path = dir.path().join("frame.png");
    let mask_path = dir.path().join("mask.png");
    save_counts(&ramp(), &data_path).unwrap();
    let mut mask = Array2::<f32>::zeros((12, 20));
    mask[[3, 4]] = 4.0;
    save_counts(&mask, &mask_path).unwrap();

    let frame = load_frame(&data_path, Some(&mask_path)).unwrap();
    assert_eq!(frame.shape(), (12, 20));
    assert_eq!(frame.mask[[3, 4]], 4);
    assert_eq!(frame.mask[[0, 0]], 0);
}

#[test]
fn test_mask_shape_must_match() {
    let dir = TempDir::new().unwrap();
    let data_path = dir.path().join("frame.png");
    let mask_path = dir.path().join("mask.png");
    save_counts(&ramp(), &data_path).unwrap();
    save_counts(&Array2::zeros((5, 5)), &mask_path).unwrap();

    let err = load_frame(&data_path, Some(&mask_path)).unwrap_err();
    assert!(matches!(err, EchelleError::ShapeMismatch { .. }));
}

#[test]
fn test_missing_image() {
    let dir = TempDir::new().unwrap();
    assert!(load_counts(&dir.path().join("absent.png")).is_err());
}
