//! Frame type and pixel helpers — RGBA conversion, blank detection.

use image::RgbImage;

/// Pixels whose brightest channel is below this count as black.
const BLACK_LEVEL: u8 = 32;

/// A captured RGB screen frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
    pub is_blank: bool,
}

/// Convert packed RGBA (4 bytes/pixel) to an RGB image, dropping alpha.
pub fn rgba_to_rgb(rgba: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: rgba.len() });
    }

    let rgb: Vec<u8> = rgba[..expected]
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: rgba.len(),
    })
}

/// True when more than `threshold_pct` of pixels are near-black.
///
/// Locked screens and captures denied by the OS come back black.
pub fn is_blank_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image
        .pixels()
        .filter(|p| p.0.iter().all(|&c| c < BLACK_LEVEL))
        .count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid RGBA length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
