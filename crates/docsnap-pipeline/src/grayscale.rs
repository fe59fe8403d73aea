//! Frame decoding and grayscale conversion.
//!
//! Frames arrive as RGBA rasters (the layout a camera canvas hands out).
//! Sources that read encoded stills go through [`decode_frame`] first.
//! Everything downstream of the first pipeline step works on a
//! single-channel [`GrayImage`].

use image::GrayImage;

use crate::types::{PipelineError, RgbaImage};

/// Decode raw image bytes into an RGBA frame.
///
/// Supports PNG, JPEG, BMP, and WebP (whatever the `image` crate was
/// built with).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFrame`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded frame"]
pub fn decode_frame(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyFrame);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Convert an RGBA frame to grayscale.
///
/// Uses the `image` crate's luminance weights; alpha is ignored.
#[must_use = "returns the grayscale image"]
pub fn to_grayscale(frame: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(frame)
}
