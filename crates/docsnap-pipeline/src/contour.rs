//! Contour extraction: outermost boundaries of a binary edge map.
//!
//! Runs Suzuki-Abe border following via
//! [`imageproc::contours::find_contours`] and keeps only top-level outer
//! borders. Holes, and anything nested inside another shape, are dropped:
//! text and photos printed on a document would otherwise produce their
//! own quadrilaterals inside the page outline.

use image::GrayImage;
use imageproc::contours::BorderType;

use crate::types::{Contour, Point};

/// Extract the outermost contours of a binary edge map.
///
/// Input: white pixels (non-zero) are foreground. Contours with fewer than
/// three points cannot enclose an area and are filtered out.
#[must_use = "returns the traced contours"]
pub fn find_external_contours(edges: &GrayImage) -> Vec<Contour> {
    let contours: Vec<imageproc::contours::Contour<i32>> =
        imageproc::contours::find_contours(edges);

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| c.points.len() >= 3)
        .map(|c| Contour::new(c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect()))
        .collect()
}
