//! Focus scoring by variance of the Laplacian.
//!
//! An in-focus frame has strong second derivatives along every edge, so
//! its Laplacian response is spread wide around its mean. A defocused
//! frame smears those edges and the response collapses toward a
//! constant. The score is a relative measure; what counts as sharp
//! depends on camera and lighting, hence
//! [`DetectionConfig::min_focus_threshold`](crate::DetectionConfig::min_focus_threshold).

use crate::vision::VisionOps;

/// Focus score of a grayscale frame: the population variance of its
/// Laplacian response.
#[must_use]
pub fn evaluate<V: VisionOps>(vision: &V, gray: &V::Gray) -> f64 {
    let response = vision.laplacian(gray);
    variance(response.as_raw())
}

/// Population variance (denominator `n`, not `n - 1`).
///
/// Returns `0.0` for an empty slice.
#[must_use]
pub fn variance(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n
}
