mod geom;
mod index;
mod overlap;

pub use geom::Geometries;
pub use index::SpatialIndex;
pub use overlap::{checked_area, checked_bounds, coverage, intersection, intersection_area, GeometryError};

#[cfg(test)]
pub(crate) use overlap::intersection_count;
