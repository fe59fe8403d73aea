//! Polygon predicates: convexity and bounding box.

use crate::types::{Polygon, Rect};

/// `true` if the polygon is strictly convex.
///
/// Every turn between consecutive edges must have the same orientation.
/// A zero cross product (collinear or repeated vertices) counts as
/// non-convex, as does any polygon with fewer than three vertices.
#[must_use]
pub fn is_convex(polygon: &Polygon) -> bool {
    let v = polygon.vertices();
    let n = v.len();
    if n < 3 {
        return false;
    }

    let mut orientation = 0i64;
    for i in 0..n {
        let a = v[i];
        let b = v[(i + 1) % n];
        let c = v[(i + 2) % n];
        let cross = i64::from(b.x - a.x) * i64::from(c.y - b.y)
            - i64::from(b.y - a.y) * i64::from(c.x - b.x);
        if cross == 0 {
            return false;
        }
        let sign = cross.signum();
        if orientation == 0 {
            orientation = sign;
        } else if sign != orientation {
            return false;
        }
    }
    true
}

/// Axis-aligned bounding box of the polygon's vertices, in the same pixel
/// space as the vertices.
///
/// Pixel-inclusive: a box spanning columns 50 through 249 is 200 wide.
/// An empty polygon yields an all-zero rect.
#[must_use]
pub fn bounding_rect(polygon: &Polygon) -> Rect {
    let v = polygon.vertices();
    let (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) = (
        v.iter().map(|p| p.x).min(),
        v.iter().map(|p| p.x).max(),
        v.iter().map(|p| p.y).min(),
        v.iter().map(|p| p.y).max(),
    ) else {
        return Rect::new(0.0, 0.0, 0.0, 0.0);
    };

    Rect::new(
        f64::from(min_x),
        f64::from(min_y),
        f64::from(max_x - min_x + 1),
        f64::from(max_y - min_y + 1),
    )
}
