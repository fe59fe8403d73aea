//! Canny edge detection and morphological gap closing.
//!
//! [`canny`] wraps [`imageproc::edges::canny`] and returns a binary map
//! (255 = edge, 0 = background). [`close_gaps`] then bridges the small
//! breaks Canny leaves along a document border, so contour tracing sees
//! one closed outline instead of several open fragments.

use image::GrayImage;
use imageproc::distance_transform::Norm;

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero lets hysteresis walk onto the unfilled
/// one-pixel border of the suppressed gradient map, and marks every
/// pixel with any gradient as a potential edge.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Both thresholds are clamped to a minimum of [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to be at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    imageproc::edges::canny(image, low, high)
}

/// Morphological closing (dilate, then erode) of a binary edge map.
///
/// Uses a square structuring element of half-width `radius` (a
/// `2*radius + 1` square kernel). A radius of zero returns the map
/// unchanged.
#[must_use = "returns the closed edge map"]
pub fn close_gaps(edges: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return edges.clone();
    }
    imageproc::morphology::close(edges, Norm::LInf, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_edges(image: &GrayImage) -> u32 {
        image.pixels().map(|p| u32::from(p.0[0] > 0)).sum()
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_pixel(20, 20, image::Luma([128]));
        let edges = canny(&img, 50.0, 150.0);
        assert_eq!(edges.dimensions(), (20, 20));
        assert_eq!(count_edges(&edges), 0, "expected no edges in uniform image");
    }

    #[test]
    fn sharp_boundary_produces_edges() {
        let img = GrayImage::from_fn(20, 20, |x, _y| {
            if x < 10 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        });
        let edges = canny(&img, 50.0, 150.0);
        assert!(count_edges(&edges) > 0, "expected edges at sharp boundary");
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn zero_thresholds_are_clamped() {
        let img = GrayImage::from_fn(20, 20, |x, y| image::Luma([((x * 7 + y * 3) % 256) as u8]));
        // Must not panic; clamping keeps hysteresis off the image border.
        let edges = canny(&img, 0.0, 0.0);
        assert_eq!(edges.dimensions(), (20, 20));
    }

    #[test]
    fn closing_bridges_a_one_pixel_gap() {
        let mut img = GrayImage::new(20, 5);
        for x in 2..18 {
            if x != 10 {
                img.put_pixel(x, 2, image::Luma([255]));
            }
        }
        let closed = close_gaps(&img, 1);
        assert_eq!(closed.get_pixel(10, 2).0[0], 255);
    }

    #[test]
    fn zero_radius_is_identity() {
        let mut img = GrayImage::new(8, 8);
        img.put_pixel(3, 3, image::Luma([255]));
        assert_eq!(close_gaps(&img, 0), img);
    }
}
