//! Shared types for the docsnap detection pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage`, the colour frame format the pipeline consumes.
pub use image::RgbaImage;

/// A 2D point on the integer pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: i32,
    /// Vertical position (pixels from top edge).
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// A closed boundary traced in a binary edge map.
///
/// The last point connects back to the first; the closing point is not
/// repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from its boundary points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns the number of boundary points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a slice of all boundary points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }
}

/// A simplified contour produced by polygon approximation.
///
/// Only a convex polygon with exactly four vertices is a document
/// candidate; see [`Polygon::is_quadrilateral`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon(Vec<Point>);

impl Polygon {
    /// Create a polygon from its vertices in boundary order.
    #[must_use]
    pub const fn new(vertices: Vec<Point>) -> Self {
        Self(vertices)
    }

    /// Number of vertices.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.0.len()
    }

    /// `true` when the polygon has exactly four vertices.
    #[must_use]
    pub const fn is_quadrilateral(&self) -> bool {
        self.0.len() == 4
    }

    /// Returns a slice of the vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.0
    }
}

/// An axis-aligned rectangle.
///
/// Which coordinate space a `Rect` lives in depends on where it came
/// from: [`VisionOps::bounding_rect`](crate::VisionOps::bounding_rect)
/// returns native frame pixels, while every rect produced by the
/// validator, the selector, and the tracker is in container space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Rect {
    /// Create a new rect.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `width * height`.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// `width / height`.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Map a native-pixel rect into container space.
    #[must_use]
    pub fn to_container(&self, scale: Scale) -> Self {
        Self {
            x: self.x / scale.x,
            y: self.y / scale.y,
            width: self.width / scale.x,
            height: self.height / scale.y,
        }
    }

    /// Map a container-space rect back into native frame pixels.
    #[must_use]
    pub fn to_native(&self, scale: Scale) -> Self {
        Self {
            x: self.x * scale.x,
            y: self.y * scale.y,
            width: self.width * scale.x,
            height: self.height * scale.y,
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Native-frame-to-container scale factors.
///
/// `x = native_width / container_width`, `y = native_height /
/// container_height`. Fixed once per session, when the frame source
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Horizontal factor.
    pub x: f64,
    /// Vertical factor.
    pub y: f64,
}

impl Scale {
    /// The identity scale (native frame == container).
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };

    /// Derive the scale factors for frames of `native` size shown in the
    /// container described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyFrame`] if either native dimension
    /// is zero.
    pub fn between(native: Dimensions, config: &DetectionConfig) -> Result<Self, PipelineError> {
        if native.width == 0 || native.height == 0 {
            return Err(PipelineError::EmptyFrame);
        }
        Ok(Self {
            x: f64::from(native.width) / config.container_width,
            y: f64::from(native.height) / config.container_height,
        })
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Acceptance thresholds for document detection.
///
/// Set once when a [`DetectionPipeline`](crate::DetectionPipeline) is
/// built and never mutated afterwards. Two tunings have been used in
/// practice, available as [`loose`](Self::loose) (the default) and
/// [`strict`](Self::strict).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum Laplacian variance for a frame to count as in focus.
    pub min_focus_threshold: f64,

    /// Smallest accepted `rect area / container area` (inclusive).
    pub min_area_fraction: f64,

    /// Largest accepted `rect area / container area` (inclusive).
    pub max_area_fraction: f64,

    /// Smallest accepted `width / height` (inclusive).
    pub min_aspect_ratio: f64,

    /// Largest accepted `width / height` (inclusive).
    pub max_aspect_ratio: f64,

    /// Width of the target region, in container units.
    pub container_width: f64,

    /// Height of the target region, in container units.
    pub container_height: f64,

    /// Two rects are similar only if both `|dx|` and `|dy|` are strictly
    /// below this.
    pub position_threshold: f64,

    /// Two rects are similar only if both `|dwidth|` and `|dheight|` are
    /// strictly below this.
    pub size_threshold: f64,

    /// Consecutive similar detections required before capturing.
    pub stability_threshold: u32,
}

impl DetectionConfig {
    /// Default minimum focus score.
    pub const DEFAULT_MIN_FOCUS_THRESHOLD: f64 = 120.0;
    /// Default minimum area fraction.
    pub const DEFAULT_MIN_AREA_FRACTION: f64 = 0.3;
    /// Default maximum area fraction.
    pub const DEFAULT_MAX_AREA_FRACTION: f64 = 0.9;
    /// Default minimum aspect ratio.
    pub const DEFAULT_MIN_ASPECT_RATIO: f64 = 1.0;
    /// Default maximum aspect ratio.
    pub const DEFAULT_MAX_ASPECT_RATIO: f64 = 4.0;
    /// Default container width.
    pub const DEFAULT_CONTAINER_WIDTH: f64 = 384.0;
    /// Default container height.
    pub const DEFAULT_CONTAINER_HEIGHT: f64 = 272.0;
    /// Default position similarity threshold.
    pub const DEFAULT_POSITION_THRESHOLD: f64 = 10.0;
    /// Default size similarity threshold.
    pub const DEFAULT_SIZE_THRESHOLD: f64 = 20.0;
    /// Default streak length that triggers a capture.
    pub const DEFAULT_STABILITY_THRESHOLD: u32 = 5;

    /// Permissive tuning: focus >= 120, area 0.3-0.9, aspect 1.0-4.0.
    #[must_use]
    pub fn loose() -> Self {
        Self::default()
    }

    /// Tight tuning for ID-card sized targets: focus >= 180, area
    /// 0.6-0.9, aspect 1.4-1.7.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            min_focus_threshold: 180.0,
            min_area_fraction: 0.6,
            max_area_fraction: 0.9,
            min_aspect_ratio: 1.4,
            max_aspect_ratio: 1.7,
            ..Self::default()
        }
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// violated constraint.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_owned()));

        let bounds = [
            self.min_focus_threshold,
            self.min_area_fraction,
            self.max_area_fraction,
            self.min_aspect_ratio,
            self.max_aspect_ratio,
            self.container_width,
            self.container_height,
            self.position_threshold,
            self.size_threshold,
        ];
        if !bounds.iter().all(|v| v.is_finite()) {
            return fail("thresholds must be finite");
        }
        if !(self.container_width > 0.0 && self.container_height > 0.0) {
            return fail("container dimensions must be positive");
        }
        if !(self.min_focus_threshold >= 0.0) {
            return fail("min_focus_threshold must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.min_area_fraction)
            || !(0.0..=1.0).contains(&self.max_area_fraction)
        {
            return fail("area fractions must lie in 0.0..=1.0");
        }
        if self.min_area_fraction > self.max_area_fraction {
            return fail("min_area_fraction exceeds max_area_fraction");
        }
        if !(self.min_aspect_ratio > 0.0) || self.min_aspect_ratio > self.max_aspect_ratio {
            return fail("aspect ratio bounds must satisfy 0 < min <= max");
        }
        if !(self.position_threshold > 0.0 && self.size_threshold > 0.0) {
            return fail("similarity thresholds must be positive");
        }
        if self.stability_threshold == 0 {
            return fail("stability_threshold must be at least 1");
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_focus_threshold: Self::DEFAULT_MIN_FOCUS_THRESHOLD,
            min_area_fraction: Self::DEFAULT_MIN_AREA_FRACTION,
            max_area_fraction: Self::DEFAULT_MAX_AREA_FRACTION,
            min_aspect_ratio: Self::DEFAULT_MIN_ASPECT_RATIO,
            max_aspect_ratio: Self::DEFAULT_MAX_ASPECT_RATIO,
            container_width: Self::DEFAULT_CONTAINER_WIDTH,
            container_height: Self::DEFAULT_CONTAINER_HEIGHT,
            position_threshold: Self::DEFAULT_POSITION_THRESHOLD,
            size_threshold: Self::DEFAULT_SIZE_THRESHOLD,
            stability_threshold: Self::DEFAULT_STABILITY_THRESHOLD,
        }
    }
}

/// Why a frame or a candidate quadrilateral was turned down.
///
/// Reasons feed user-facing feedback and diagnostics only; the pipeline
/// never branches on which reason was reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The frame's focus score is below the configured minimum. No
    /// contour search was attempted.
    Blurry {
        /// Measured focus score.
        sharpness: f64,
        /// Configured minimum.
        threshold: f64,
    },
    /// The candidate's bounding box leaves the container.
    OutsideContainer,
    /// The candidate covers too little or too much of the container.
    AreaOutOfRange {
        /// `rect area / container area`.
        ratio: f64,
    },
    /// The candidate is too narrow or too wide.
    AspectOutOfRange {
        /// `width / height`.
        ratio: f64,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blurry {
                sharpness,
                threshold,
            } => write!(f, "too blurry (sharpness {sharpness:.1} < {threshold:.1})"),
            Self::OutsideContainer => f.write_str("document not fully inside the frame"),
            Self::AreaOutOfRange { ratio } => {
                write!(f, "document size out of range ({:.1}% of frame)", ratio * 100.0)
            }
            Self::AspectOutOfRange { ratio } => {
                write!(f, "document proportions out of range (aspect {ratio:.2})")
            }
        }
    }
}

/// Outcome of evaluating one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectionResult {
    /// No quadrilateral was found.
    NoCandidate,
    /// The frame, or every quadrilateral in it, was rejected.
    CandidateRejected(RejectReason),
    /// A document was detected at this container-space rect.
    CandidateAccepted(Rect),
}

impl DetectionResult {
    /// The accepted rect, if any.
    #[must_use]
    pub const fn accepted(&self) -> Option<Rect> {
        match self {
            Self::CandidateAccepted(rect) => Some(*rect),
            Self::NoCandidate | Self::CandidateRejected(_) => None,
        }
    }
}

impl std::fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidate => f.write_str("no document found"),
            Self::CandidateRejected(reason) => write!(f, "rejected: {reason}"),
            Self::CandidateAccepted(rect) => write!(
                f,
                "document at ({:.0}, {:.0}) {:.0}x{:.0}",
                rect.x, rect.y, rect.width, rect.height,
            ),
        }
    }
}

/// Errors that can occur while setting up or feeding the pipeline.
///
/// Per-tick outcomes such as a blurry frame or a missing document are
/// not errors; they are reported through
/// [`DetectionResult`](crate::DetectionResult).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an encoded frame.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The frame has no pixels or the encoded input was empty.
    #[error("frame is empty")]
    EmptyFrame,

    /// Configuration violates an invariant.
    #[error("invalid detection configuration: {0}")]
    InvalidConfig(String),
}
