//! Pre-edge smoothing.
//!
//! Camera frames carry sensor noise and paper texture; left alone, Canny
//! answers both with short edge fragments that break the page outline
//! into pieces. A light Gaussian (sigma around 1) removes them while
//! keeping the page border crisp enough to trace.

use image::GrayImage;

/// Smooth `gray` with a Gaussian of standard deviation `sigma`.
///
/// `imageproc` rejects a sigma of zero or below, so such values (and
/// NaN) mean "no smoothing" and hand back a copy.
#[must_use = "returns the smoothed frame"]
pub fn gaussian_blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma.is_nan() || sigma <= 0.0 {
        return gray.clone();
    }
    imageproc::filter::gaussian_blur_f32(gray, sigma)
}
