//! Image-processing primitives consumed by the detection pipeline.
//!
//! The pipeline never touches pixels directly; it drives a [`VisionOps`]
//! implementation. [`ImageprocVision`] is the production backend, built
//! on `image` and `imageproc`. Tests substitute lightweight fakes to
//! script sharpness scores and contours frame by frame.
//!
//! # Strategy pattern
//!
//! Raster handles are associated types, so a backend decides what a
//! frame, a grayscale image, and an edge map are. The pipeline only owns
//! them for the duration of one tick; they are dropped on every exit
//! path when the tick's scope ends.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;
use serde::{Deserialize, Serialize};

use crate::types::{Contour, Dimensions, PipelineError, Polygon, Rect, RgbaImage};

/// Signed second-derivative response, one value per grayscale pixel.
pub type LaplacianResponse = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Four-neighbour 3x3 Laplacian.
const LAPLACIAN_3X3: [i32; 9] = [0, 1, 0, 1, -4, 1, 0, 1, 0];

/// Parameters for the blur -> edge -> close chain.
///
/// These feed [`VisionOps`] calls and are independent of the
/// acceptance thresholds in [`DetectionConfig`](crate::DetectionConfig).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Gaussian blur sigma applied before edge detection.
    pub blur_sigma: f32,

    /// Canny low (hysteresis) threshold.
    pub canny_low: f32,

    /// Canny high threshold.
    pub canny_high: f32,

    /// Half-width of the square structuring element used to close gaps
    /// in the edge map. Zero disables closing.
    pub close_radius: u8,

    /// Polygon approximation tolerance as a fraction of each contour's
    /// perimeter.
    pub approx_epsilon_factor: f64,
}

impl VisionConfig {
    /// Default blur sigma (what a 5x5 kernel with automatic sigma uses).
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.1;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 150.0;
    /// Default closing radius (5x5 element).
    pub const DEFAULT_CLOSE_RADIUS: u8 = 2;
    /// Default approximation factor.
    pub const DEFAULT_APPROX_EPSILON_FACTOR: f64 = crate::select::APPROX_EPSILON_FACTOR;

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_owned()));

        if !(self.blur_sigma >= 0.0 && self.blur_sigma.is_finite()) {
            return fail("blur_sigma must be finite and non-negative");
        }
        if !(self.canny_low >= 0.0 && self.canny_high.is_finite()) {
            return fail("canny thresholds must be finite and non-negative");
        }
        if self.canny_low > self.canny_high {
            return fail("canny_low exceeds canny_high");
        }
        if !(self.approx_epsilon_factor > 0.0 && self.approx_epsilon_factor < 1.0) {
            return fail("approx_epsilon_factor must lie strictly between 0 and 1");
        }
        Ok(())
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            close_radius: Self::DEFAULT_CLOSE_RADIUS,
            approx_epsilon_factor: Self::DEFAULT_APPROX_EPSILON_FACTOR,
        }
    }
}

/// Primitive image operations the pipeline is built from.
///
/// Raster operations must be implemented; the geometric helpers default
/// to the crate's own implementations in [`simplify`](crate::simplify)
/// and [`polygon`](crate::polygon).
pub trait VisionOps {
    /// A colour camera frame.
    type Frame;
    /// A single-channel image derived from a frame.
    type Gray;
    /// A binary edge map.
    type Edges;

    /// Pixel size of a frame.
    fn dimensions(&self, frame: &Self::Frame) -> Dimensions;

    /// Convert a frame to grayscale.
    fn to_grayscale(&self, frame: &Self::Frame) -> Self::Gray;

    /// Laplacian filter response of a grayscale image.
    fn laplacian(&self, gray: &Self::Gray) -> LaplacianResponse;

    /// Gaussian blur with standard deviation `sigma`.
    fn gaussian_blur(&self, gray: &Self::Gray, sigma: f32) -> Self::Gray;

    /// Canny edge detection.
    fn canny_edges(&self, gray: &Self::Gray, low: f32, high: f32) -> Self::Edges;

    /// Morphological closing with a square element of half-width `radius`.
    fn morphological_close(&self, edges: &Self::Edges, radius: u8) -> Self::Edges;

    /// Outermost contours of an edge map.
    fn find_external_contours(&self, edges: &Self::Edges) -> Vec<Contour>;

    /// Contour perimeter.
    fn arc_length(&self, contour: &Contour, closed: bool) -> f64 {
        crate::simplify::arc_length(contour, closed)
    }

    /// Douglas-Peucker approximation within `tolerance` pixels.
    fn approx_polygon(&self, contour: &Contour, tolerance: f64, closed: bool) -> Polygon {
        crate::simplify::approximate_polygon(contour, tolerance, closed)
    }

    /// Strict convexity test.
    fn is_convex(&self, polygon: &Polygon) -> bool {
        crate::polygon::is_convex(polygon)
    }

    /// Bounding box in native frame pixels.
    fn bounding_rect(&self, polygon: &Polygon) -> Rect {
        crate::polygon::bounding_rect(polygon)
    }
}

/// [`VisionOps`] backed by the `image` and `imageproc` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocVision;

impl VisionOps for ImageprocVision {
    type Frame = RgbaImage;
    type Gray = GrayImage;
    type Edges = GrayImage;

    fn dimensions(&self, frame: &RgbaImage) -> Dimensions {
        Dimensions {
            width: frame.width(),
            height: frame.height(),
        }
    }

    fn to_grayscale(&self, frame: &RgbaImage) -> GrayImage {
        crate::grayscale::to_grayscale(frame)
    }

    fn laplacian(&self, gray: &GrayImage) -> LaplacianResponse {
        if gray.width() == 0 || gray.height() == 0 {
            return LaplacianResponse::new(gray.width(), gray.height());
        }
        let response: Image<Luma<i16>> = filter_clamped(gray, Kernel::new(&LAPLACIAN_3X3, 3, 3));
        ImageBuffer::from_fn(response.width(), response.height(), |x, y| {
            Luma([f32::from(response.get_pixel(x, y).0[0])])
        })
    }

    fn gaussian_blur(&self, gray: &GrayImage, sigma: f32) -> GrayImage {
        crate::blur::gaussian_blur(gray, sigma)
    }

    fn canny_edges(&self, gray: &GrayImage, low: f32, high: f32) -> GrayImage {
        crate::edge::canny(gray, low, high)
    }

    fn morphological_close(&self, edges: &GrayImage, radius: u8) -> GrayImage {
        crate::edge::close_gaps(edges, radius)
    }

    fn find_external_contours(&self, edges: &GrayImage) -> Vec<Contour> {
        crate::contour::find_external_contours(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_config_defaults() {
        let config = VisionConfig::default();
        assert!((config.blur_sigma - 1.1).abs() < f32::EPSILON);
        assert!((config.canny_low - 50.0).abs() < f32::EPSILON);
        assert!((config.canny_high - 150.0).abs() < f32::EPSILON);
        assert_eq!(config.close_radius, 2);
        assert!((config.approx_epsilon_factor - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn vision_config_validation() {
        assert!(VisionConfig::default().validate().is_ok());
        let inverted = VisionConfig {
            canny_low: 200.0,
            canny_high: 100.0,
            ..VisionConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
        let zero_epsilon = VisionConfig {
            approx_epsilon_factor: 0.0,
            ..VisionConfig::default()
        };
        assert!(zero_epsilon.validate().is_err());
    }

    #[test]
    fn vision_config_partial_json_uses_defaults() {
        let config: VisionConfig = serde_json::from_str(r#"{"canny_low": 30.0}"#).unwrap_or_default();
        assert!((config.canny_low - 30.0).abs() < f32::EPSILON);
        assert_eq!(config.close_radius, VisionConfig::DEFAULT_CLOSE_RADIUS);
    }

    #[test]
    fn laplacian_of_flat_image_is_zero() {
        let gray = GrayImage::from_pixel(6, 4, Luma([90]));
        let response = ImageprocVision.laplacian(&gray);
        assert_eq!(response.dimensions(), (6, 4));
        assert!(response.pixels().all(|p| p.0[0] == 0.0));
    }

    #[test]
    fn laplacian_of_isolated_bright_pixel() {
        let mut gray = GrayImage::new(5, 5);
        gray.put_pixel(2, 2, Luma([10]));
        let response = ImageprocVision.laplacian(&gray);
        assert!((response.get_pixel(2, 2).0[0] - -40.0).abs() < f32::EPSILON);
        assert!((response.get_pixel(1, 2).0[0] - 10.0).abs() < f32::EPSILON);
        assert!((response.get_pixel(1, 1).0[0]).abs() < f32::EPSILON);
    }

    #[test]
    fn frame_dimensions() {
        let frame = RgbaImage::new(64, 48);
        assert_eq!(
            ImageprocVision.dimensions(&frame),
            Dimensions {
                width: 64,
                height: 48
            }
        );
    }

    #[test]
    fn default_geometry_ops_delegate() {
        let contour = Contour::new(vec![
            crate::Point::new(0, 0),
            crate::Point::new(3, 0),
            crate::Point::new(3, 4),
        ]);
        assert!((ImageprocVision.arc_length(&contour, true) - 12.0).abs() < 1e-10);
        let poly = ImageprocVision.approx_polygon(&contour, 0.5, true);
        assert!(ImageprocVision.is_convex(&poly));
        assert_eq!(
            ImageprocVision.bounding_rect(&poly),
            Rect::new(0.0, 0.0, 4.0, 5.0)
        );
    }
}
