use std::{collections::BTreeMap, sync::Arc};

use geo::{Area, MultiPolygon};
use tracing::{debug, info};

use crate::{
    geom::{checked_area, checked_bounds, intersection, GeometryError},
    interp::{PairKey, RegionFailure},
    layer::Layer,
};

/// Pairwise intersections between the regions of two layers, keyed `(label_a, label_b)`.
#[derive(Debug, Clone, Default)]
pub struct Intersections {
    pairs: BTreeMap<PairKey, MultiPolygon<f64>>,
    failures: Vec<RegionFailure>,
}

impl Intersections {
    /// Build directly from precomputed intersection geometry.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (PairKey, MultiPolygon<f64>)>) -> Self {
        Self { pairs: pairs.into_iter().collect(), failures: Vec::new() }
    }

    #[inline] pub fn len(&self) -> usize { self.pairs.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.pairs.is_empty() }

    /// Iterate over pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, &MultiPolygon<f64>)> { self.pairs.iter() }

    /// Intersection geometry of `(a, b)`, if they overlap.
    pub fn get(&self, a: &str, b: &str) -> Option<&MultiPolygon<f64>> { self.pairs.get(&PairKey::new(a, b)) }

    /// Labels of layer-B regions overlapping the layer-A region `a`, in label order.
    pub fn partners(&self, a: &str) -> Vec<Arc<str>> {
        self.pairs.keys().filter(|key| &*key.a == a).map(|key| key.b.clone()).collect()
    }

    /// Pairs grouped by their layer-A label.
    pub fn by_a(&self) -> BTreeMap<Arc<str>, Vec<(&PairKey, &MultiPolygon<f64>)>> {
        let mut groups = BTreeMap::<Arc<str>, Vec<_>>::new();
        for (key, shape) in &self.pairs {
            groups.entry(key.a.clone()).or_default().push((key, shape));
        }
        groups
    }

    /// Layer-B regions that could not be intersected.
    #[inline] pub fn failures(&self) -> &[RegionFailure] { &self.failures }
}

/// Intersect every region of `b` with the regions of `a` it overlaps.
///
/// Candidates come from `a`'s bounding-box index; pairs whose exact intersection has no
/// area (touching boundaries) are dropped. Degenerate regions of `b` are reported as
/// failures, degenerate regions of `a` are skipped.
pub fn intersect(a: &Layer, b: &Layer) -> Intersections {
    let mut out = Intersections::default();

    for j in 0..b.len() {
        let bbox = match checked_area(b.shape(j)).and_then(|_| checked_bounds(b.shape(j))) {
            Ok(bbox) => bbox,
            Err(error) => {
                out.failures.push(RegionFailure::new(j, b.label(j), error));
                continue;
            }
        };

        for i in a.geoms().query(&bbox) {
            if let Err(error) = a.geoms().area(i) {
                debug!(a = %a.label(i), %error, "skipping region");
                continue;
            }
            let shape = intersection(a.shape(i), b.shape(j));
            let area = shape.unsigned_area();
            if !area.is_finite() {
                debug!(a = %a.label(i), b = %b.label(j), "non-finite intersection area");
                out.failures.push(RegionFailure::new(j, b.label(j), GeometryError::NonFinite));
                break;
            }
            if area > 0.0 {
                out.pairs.insert(PairKey::new(a.label(i).clone(), b.label(j).clone()), shape);
            }
        }
    }

    info!(a = a.name(), b = b.name(), pairs = out.pairs.len(), failed = out.failures.len(), "intersected layers");
    out
}
