//! Geometric acceptance of a candidate quadrilateral.
//!
//! A quadrilateral's bounding box is mapped into container space and
//! must then pass, in order:
//!
//! 1. containment: fully inside `[0, container_width] x [0, container_height]`
//! 2. area fraction: `min_area_fraction <= area / container area <= max_area_fraction`
//! 3. aspect ratio: `min_aspect_ratio <= width / height <= max_aspect_ratio`
//!
//! All bounds are inclusive. The order only decides which
//! [`RejectReason`] is reported when several tests fail.

use crate::types::{DetectionConfig, Polygon, Rect, RejectReason, Scale};
use crate::vision::VisionOps;

/// Validate a four-vertex convex polygon against the container.
///
/// The caller is responsible for the structural checks (exactly four
/// vertices, convex); see [`crate::select`].
///
/// # Errors
///
/// Returns the first failing test as a [`RejectReason`].
pub fn validate<V: VisionOps>(
    vision: &V,
    polygon: &Polygon,
    scale: Scale,
    config: &DetectionConfig,
) -> Result<Rect, RejectReason> {
    validate_rect(vision.bounding_rect(polygon), scale, config)
}

/// Validate a native-pixel bounding box against the container.
///
/// On success returns the box in container space.
///
/// # Errors
///
/// Returns the first failing test as a [`RejectReason`].
pub fn validate_rect(
    native: Rect,
    scale: Scale,
    config: &DetectionConfig,
) -> Result<Rect, RejectReason> {
    let rect = native.to_container(scale);

    let inside = rect.x >= 0.0
        && rect.y >= 0.0
        && rect.x + rect.width <= config.container_width
        && rect.y + rect.height <= config.container_height;
    if !inside {
        return Err(RejectReason::OutsideContainer);
    }

    let area_ratio = rect.area() / (config.container_width * config.container_height);
    if !(config.min_area_fraction..=config.max_area_fraction).contains(&area_ratio) {
        return Err(RejectReason::AreaOutOfRange { ratio: area_ratio });
    }

    let aspect_ratio = rect.aspect_ratio();
    if !(config.min_aspect_ratio..=config.max_aspect_ratio).contains(&aspect_ratio) {
        return Err(RejectReason::AspectOutOfRange {
            ratio: aspect_ratio,
        });
    }

    Ok(rect)
}
