use geo::{MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

use crate::geom::checked_bounds;

/// An R-tree entry: the bounding rectangle of one shape, tagged with its position.
#[derive(Debug, Clone)]
struct Entry {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for Entry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Bounding-box index over a fixed collection of shapes.
///
/// Queries return every shape whose bounding box intersects the query box,
/// so callers must still run an exact intersection test on the candidates.
/// Shapes without a usable bounding box (empty geometries, non-finite coordinates)
/// are left out of the tree and never returned.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    rtree: RTree<Entry>,
    len: usize,
}

impl SpatialIndex {
    /// Bulk-load an index over `shapes`; candidate ids are positions in `shapes`.
    pub fn build<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let mut len = 0;
        let entries = shapes.into_iter()
            .inspect(|_| len += 1)
            .enumerate()
            .filter_map(|(idx, shape)| checked_bounds(shape).ok().map(|bbox| Entry { idx, bbox }))
            .collect();

        Self { rtree: RTree::bulk_load(entries), len }
    }

    /// Number of shapes the index was built over (including empty ones).
    #[inline] pub fn len(&self) -> usize { self.len }

    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Number of shapes actually present in the tree.
    #[inline] pub fn indexed(&self) -> usize { self.rtree.size() }

    /// Ids of all shapes whose bounding box intersects `bbox`, in ascending order.
    pub fn query(&self, bbox: &Rect<f64>) -> Vec<usize> {
        let envelope = AABB::from_corners(bbox.min().into(), bbox.max().into());
        let mut ids = self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.idx)
            .collect::<Vec<_>>();

        // R-tree traversal order depends on tree shape; callers break ties by position.
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    #[test]
    fn query_returns_overlapping_boxes_in_order() {
        let shapes = vec![
            square(2.0, 0.0, 3.0, 1.0),
            square(0.0, 0.0, 1.0, 1.0),
            square(1.0, 0.0, 2.0, 1.0),
        ];
        let index = SpatialIndex::build(&shapes);

        let hits = index.query(&Rect::new(Coord { x: 0.5, y: 0.2 }, Coord { x: 1.5, y: 0.8 }));
        assert_eq!(hits, vec![1, 2]);

        // Touching boxes count as candidates; exact filtering is the caller's job.
        let hits = index.query(&Rect::new(Coord { x: 3.0, y: 0.0 }, Coord { x: 4.0, y: 1.0 }));
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn query_far_away_is_empty() {
        let index = SpatialIndex::build(&[square(0.0, 0.0, 1.0, 1.0)]);
        assert!(index.query(&Rect::new(Coord { x: 5.0, y: 5.0 }, Coord { x: 6.0, y: 6.0 })).is_empty());
    }

    #[test]
    fn empty_shapes_are_skipped() {
        let shapes = vec![MultiPolygon::new(vec![]), square(0.0, 0.0, 1.0, 1.0)];
        let index = SpatialIndex::build(&shapes);

        assert_eq!(index.len(), 2);
        assert_eq!(index.indexed(), 1);
        assert_eq!(index.query(&Rect::new(Coord { x: -10.0, y: -10.0 }, Coord { x: 10.0, y: 10.0 })), vec![1]);
    }

    #[test]
    fn non_finite_shapes_are_left_out_of_a_bulk_load() {
        let nan = Polygon::new(
            LineString::from(vec![(f64::NAN, f64::NAN), (1.0, 0.0), (1.0, 1.0), (f64::NAN, f64::NAN)]),
            vec![],
        );
        let mut shapes = (0..20).map(|k| square(k as f64, 0.0, k as f64 + 1.0, 1.0)).collect::<Vec<_>>();
        shapes.insert(7, MultiPolygon::new(vec![nan]));

        let index = SpatialIndex::build(&shapes);

        assert_eq!(index.len(), 21);
        assert_eq!(index.indexed(), 20);
        let hits = index.query(&Rect::new(Coord { x: -100.0, y: -100.0 }, Coord { x: 100.0, y: 100.0 }));
        assert_eq!(hits.len(), 20);
        assert!(!hits.contains(&7));
    }
}
