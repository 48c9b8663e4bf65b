use std::path::Path;

use image::{ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{EchelleError, Result};
use crate::frame::Frame;

/// Load a grayscale image as raw counts (16-bit range, no normalization).
pub fn load_counts(path: &Path) -> Result<Array2<f32>> {
    let gray = image::open(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    let data: Vec<f32> = gray.into_raw().into_iter().map(f32::from).collect();
    Array2::from_shape_vec((h as usize, w as usize), data)
        .map_err(|e| EchelleError::InvalidConfig(format!("{}: {e}", path.display())))
}

/// Load a bad-pixel mask; each pixel value is used as the mask bits.
pub fn load_mask(path: &Path) -> Result<Array2<u16>> {
    let gray = image::open(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| EchelleError::InvalidConfig(format!("{}: {e}", path.display())))
}

/// Load a frame and, if given, its mask.
pub fn load_frame(data_path: &Path, mask_path: Option<&Path>) -> Result<Frame> {
    let data = load_counts(data_path)?;
    match mask_path {
        Some(m) => Frame::with_mask(data, load_mask(m)?),
        None => Ok(Frame::new(data)),
    }
}

/// Save counts as a 16-bit grayscale image. Values are rounded and clamped
/// to `[0, 65535]`; the format follows the extension (TIFF by default).
pub fn save_counts(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let pixels: Vec<u16> = data
        .iter()
        .map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16)
        .collect();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| EchelleError::InvalidConfig("image buffer size mismatch".into()))?;

    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => ImageFormat::Png,
        _ => ImageFormat::Tiff,
    };
    img.save_with_format(path, format)?;
    Ok(())
}
