use geo::{Area, BooleanOps, BoundingRect, CoordsIter, MultiPolygon, Rect};
use thiserror::Error;

/// Why a geometric operation on a single region could not produce a usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("geometry is empty")]
    Empty,
    #[error("geometry has non-finite coordinates or area")]
    NonFinite,
    #[error("geometry has zero area")]
    ZeroArea,
    #[error("no candidate region to match against")]
    NoCandidates,
}

#[cfg(test)]
thread_local! {
    static INTERSECTIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Number of exact intersections computed on this thread (test builds only).
#[cfg(test)]
pub(crate) fn intersection_count() -> usize { INTERSECTIONS.with(|n| n.get()) }

/// Area of `shape`, rejecting empty, non-finite and zero-area geometry.
pub fn checked_area(shape: &MultiPolygon<f64>) -> Result<f64, GeometryError> {
    if shape.0.is_empty() { return Err(GeometryError::Empty) }
    if shape.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::NonFinite)
    }

    let area = shape.unsigned_area();
    if !area.is_finite() { return Err(GeometryError::NonFinite) }
    if area <= 0.0 { return Err(GeometryError::ZeroArea) }
    Ok(area)
}

/// Bounding box of `shape`. `Empty` if it has no coordinates, `NonFinite` if any coordinate is NaN or infinite.
pub fn checked_bounds(shape: &MultiPolygon<f64>) -> Result<Rect<f64>, GeometryError> {
    let bbox = shape.bounding_rect().ok_or(GeometryError::Empty)?;
    if shape.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::NonFinite)
    }
    Ok(bbox)
}

/// Exact intersection of two shapes.
pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    #[cfg(test)]
    INTERSECTIONS.with(|n| n.set(n.get() + 1));

    a.intersection(b)
}

/// Area of `a ∩ b`. Zero for disjoint or merely touching shapes.
pub fn intersection_area(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<f64, GeometryError> {
    let area = intersection(a, b).unsigned_area();
    if !area.is_finite() { return Err(GeometryError::NonFinite) }
    Ok(area)
}

/// Fraction of `part` covered by `other`: `area(part ∩ other) / area(part)`.
pub fn coverage(part: &MultiPolygon<f64>, other: &MultiPolygon<f64>) -> Result<f64, GeometryError> {
    let area = checked_area(part)?;
    Ok(intersection_area(part, other)? / area)
}
