use std::sync::OnceLock;

use geo::{BooleanOps, Centroid, Coord, MultiPolygon, Point, Rect};

use crate::geom::{checked_area, checked_bounds, GeometryError, SpatialIndex};

/// Geometries represents a collection of MultiPolygons with a bounding-box index.
///
/// Shapes are never mutated after construction. Areas are computed eagerly,
/// centroids on first use.
#[derive(Debug, Clone)]
pub struct Geometries {
    shapes: Vec<MultiPolygon<f64>>,
    index: SpatialIndex,
    areas: Vec<Result<f64, GeometryError>>,
    centroids: OnceLock<Vec<Option<Point<f64>>>>,
}

impl Geometries {
    /// Construct a Geometries object from a vector of MultiPolygons.
    pub fn new(shapes: Vec<MultiPolygon<f64>>) -> Self {
        Self {
            index: SpatialIndex::build(&shapes),
            areas: shapes.iter().map(checked_area).collect(),
            centroids: OnceLock::new(),
            shapes,
        }
    }

    /// Get the number of MultiPolygons.
    #[inline] pub fn len(&self) -> usize { self.shapes.len() }

    /// Check if there are no MultiPolygons.
    #[inline] pub fn is_empty(&self) -> bool { self.shapes.is_empty() }

    /// Get a reference to the list of MultiPolygons.
    #[inline] pub fn shapes(&self) -> &[MultiPolygon<f64>] { &self.shapes }

    /// Get a reference to a single MultiPolygon.
    #[inline] pub fn shape(&self, i: usize) -> &MultiPolygon<f64> { &self.shapes[i] }

    /// Area of shape `i`, or the reason it has no usable area.
    #[inline] pub fn area(&self, i: usize) -> Result<f64, GeometryError> { self.areas[i] }

    /// Bounding box of shape `i`.
    #[inline] pub fn bbox(&self, i: usize) -> Result<Rect<f64>, GeometryError> { checked_bounds(&self.shapes[i]) }

    /// Get the bounding-box index over all shapes.
    #[inline] pub fn index(&self) -> &SpatialIndex { &self.index }

    /// Ids of shapes whose bounding box intersects `bbox`, ascending.
    #[inline] pub fn query(&self, bbox: &Rect<f64>) -> Vec<usize> { self.index.query(bbox) }

    /// Centroids of all shapes (None for empty shapes), computed once and cached.
    pub fn centroids(&self) -> &[Option<Point<f64>>] {
        self.centroids.get_or_init(|| {
            self.shapes.iter()
                .map(|shape| shape.centroid().filter(|p| p.x().is_finite() && p.y().is_finite()))
                .collect()
        })
    }

    /// Index of (and distance to) the shape whose centroid is nearest to `point`.
    /// Ties go to the lower index.
    pub fn nearest_centroid(&self, point: Point<f64>) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, centroid) in self.centroids().iter().enumerate() {
            let Some(centroid) = centroid else { continue };
            let distance = (centroid.x() - point.x()).hypot(centroid.y() - point.y());
            if best.is_none_or(|(_, d)| distance < d) { best = Some((i, distance)) }
        }
        best
    }

    /// Compute the bounding rectangle of all MultiPolygons.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        (0..self.len())
            .filter_map(|i| self.bbox(i).ok())
            .reduce(|a, b| Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                }
            ))
    }

    /// Union of the shapes at `ids` into a single MultiPolygon.
    /// This method may be slow for large numbers of complex polygons.
    pub fn union_of(&self, ids: &[usize]) -> MultiPolygon<f64> {
        ids.iter()
            .map(|&i| self.shapes[i].clone())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| MultiPolygon::new(vec![]))
    }
}
