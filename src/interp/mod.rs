mod apportion;
mod config;
mod contain;
mod distribute;
mod equality;
mod intersect;
mod pairs;
mod report;

pub use apportion::{apportion, apportion_geometric, Apportionment};
pub use config::Tolerances;
pub use contain::{distribute_staged, reduce, Containment, ContainmentRecord};
pub use distribute::{assign, distribute, match_region, Assignment, Distributed, Match, MatchKind};
pub use equality::{dedupe_vintages, same_plan};
pub use intersect::{intersect, Intersections};
pub use pairs::{KeyEncoding, PairKey, PairTable};
pub use report::RegionFailure;
