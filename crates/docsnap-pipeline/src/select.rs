//! Candidate selection: the single best document rectangle in a frame.
//!
//! Every contour is approximated to a polygon with a tolerance of
//! [`APPROX_EPSILON_FACTOR`] times its perimeter. Only convex
//! quadrilaterals are validated; among the accepted rects the one with
//! the strictly largest area wins, so ties keep the first encountered.

use crate::diagnostics::RejectionCounts;
use crate::geometry;
use crate::types::{Contour, DetectionConfig, Rect, RejectReason, Scale};
use crate::vision::VisionOps;

/// Polygon approximation tolerance as a fraction of contour perimeter.
pub const APPROX_EPSILON_FACTOR: f64 = 0.02;

/// Everything the selector learned about one frame's contours.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Largest accepted rect, in container space.
    pub best: Option<Rect>,
    /// Contours examined.
    pub contour_count: usize,
    /// Contours that simplified to a convex quadrilateral.
    pub quadrilateral_count: usize,
    /// Quadrilaterals that failed geometric validation, by reason.
    pub rejections: RejectionCounts,
    /// Rejection reason of the largest rejected quadrilateral.
    pub largest_rejection: Option<RejectReason>,
}

/// Pick the largest accepted rect among `contours`.
#[must_use]
pub fn select_best<V: VisionOps>(
    vision: &V,
    contours: &[Contour],
    scale: Scale,
    config: &DetectionConfig,
) -> Option<Rect> {
    select(vision, contours, scale, config, APPROX_EPSILON_FACTOR).best
}

/// Like [`select_best`] with an explicit approximation factor, also
/// reporting counts and the most relevant rejection for feedback.
#[must_use]
pub fn select<V: VisionOps>(
    vision: &V,
    contours: &[Contour],
    scale: Scale,
    config: &DetectionConfig,
    epsilon_factor: f64,
) -> Selection {
    let mut best: Option<Rect> = None;
    let mut quadrilateral_count = 0;
    let mut rejections = RejectionCounts::default();
    let mut largest_rejection: Option<(f64, RejectReason)> = None;

    for contour in contours {
        let tolerance = epsilon_factor * vision.arc_length(contour, true);
        let polygon = vision.approx_polygon(contour, tolerance, true);
        if !polygon.is_quadrilateral() || !vision.is_convex(&polygon) {
            continue;
        }
        quadrilateral_count += 1;

        match geometry::validate(vision, &polygon, scale, config) {
            Ok(rect) => {
                if best.is_none_or(|b| rect.area() > b.area()) {
                    best = Some(rect);
                }
            }
            Err(reason) => {
                rejections.record(&reason);
                let area = vision.bounding_rect(&polygon).area();
                if largest_rejection.is_none_or(|(a, _)| area > a) {
                    largest_rejection = Some((area, reason));
                }
            }
        }
    }

    Selection {
        best,
        contour_count: contours.len(),
        quadrilateral_count,
        rejections,
        largest_rejection: largest_rejection.map(|(_, reason)| reason),
    }
}
