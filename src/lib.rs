#![doc = "splitmap public API"]
pub mod batch;
mod geom;
mod interp;
mod layer;

#[doc(inline)]
pub use geom::{coverage, Geometries, GeometryError, SpatialIndex};

#[doc(inline)]
pub use layer::Layer;

#[doc(inline)]
pub use interp::{
    apportion, apportion_geometric, assign, dedupe_vintages, distribute, distribute_staged,
    intersect, match_region, reduce, same_plan,
    Apportionment, Assignment, Containment, ContainmentRecord, Distributed, Intersections,
    KeyEncoding, Match, MatchKind, PairKey, PairTable, RegionFailure, Tolerances,
};
