use std::sync::Arc;

use anyhow::{ensure, Result};
use geo::{Centroid, MultiPolygon};
use polars::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::{
    geom::{checked_area, checked_bounds, intersection_area, GeometryError},
    interp::RegionFailure,
    layer::Layer,
};

/// How a fine region obtained its coarse region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    /// Exactly one coarse region overlaps the fine region.
    Single,
    /// Several coarse regions overlap; this one covers the largest fraction of the fine region.
    Largest { fraction: f64 },
    /// No coarse region overlaps; this one has the nearest centroid.
    Nearest { distance: f64 },
    /// The fine region's group is fully contained by this coarse region.
    Inherited,
}

/// The coarse region chosen for one fine region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub coarse: usize,
    pub kind: MatchKind,
}

/// Best-matching coarse region per fine region, plus the regions that could not be matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    matches: Vec<Option<Match>>,
    failures: Vec<RegionFailure>,
}

impl Assignment {
    pub(crate) fn new(matches: Vec<Option<Match>>, failures: Vec<RegionFailure>) -> Self {
        Self { matches, failures }
    }

    /// Number of fine regions.
    #[inline] pub fn len(&self) -> usize { self.matches.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.matches.is_empty() }

    /// Per fine region, the chosen coarse region (None if unresolved).
    #[inline] pub fn matches(&self) -> &[Option<Match>] { &self.matches }

    /// Coarse region chosen for fine region `i`.
    #[inline] pub fn coarse(&self, i: usize) -> Option<usize> { self.matches[i].map(|m| m.coarse) }

    /// Fine regions skipped because of geometric failures.
    #[inline] pub fn failures(&self) -> &[RegionFailure] { &self.failures }

    /// Number of fine regions left without a coarse region.
    pub fn unresolved(&self) -> usize { self.matches.iter().filter(|m| m.is_none()).count() }

    /// `(fine label, coarse label)` for every resolved fine region, in fine order.
    pub fn label_pairs(&self, coarse: &Layer, fine: &Layer) -> Vec<(Arc<str>, Arc<str>)> {
        self.matches.iter().enumerate()
            .filter_map(|(i, m)| m.map(|m| (fine.label(i).clone(), coarse.label(m.coarse).clone())))
            .collect()
    }
}

/// A fine layer with coarse attributes copied on, and the assignment that produced it.
#[derive(Debug, Clone)]
pub struct Distributed {
    pub layer: Layer,
    pub assignment: Assignment,
}

/// Find the coarse region that best contains `shape`.
///
/// Candidates come from the coarse layer's bounding-box index and are kept only if the
/// exact intersection has positive area. One match is taken as is; among several, the one
/// covering the largest fraction of `shape` wins; with none, the nearest coarse centroid
/// is used. Ties go to the lowest coarse index.
pub fn match_region(coarse: &Layer, shape: &MultiPolygon<f64>) -> Result<Match, GeometryError> {
    let area = checked_area(shape)?;
    let bbox = checked_bounds(shape)?;

    let mut matches = SmallVec::<[(usize, f64); 4]>::new();
    for candidate in coarse.geoms().query(&bbox) {
        let overlap = intersection_area(coarse.shape(candidate), shape)?;
        if overlap > 0.0 { matches.push((candidate, overlap / area)) }
    }

    match matches.as_slice() {
        [] => {
            let centroid = shape.centroid().ok_or(GeometryError::Empty)?;
            let (coarse, distance) = coarse.geoms().nearest_centroid(centroid)
                .ok_or(GeometryError::NoCandidates)?;
            Ok(Match { coarse, kind: MatchKind::Nearest { distance } })
        }
        [(coarse, _)] => Ok(Match { coarse: *coarse, kind: MatchKind::Single }),
        [first, rest @ ..] => {
            let (coarse, fraction) = rest.iter()
                .fold(*first, |best, &next| if next.1 > best.1 { next } else { best });
            Ok(Match { coarse, kind: MatchKind::Largest { fraction } })
        }
    }
}

/// Match every fine region against the coarse layer.
pub fn assign(coarse: &Layer, fine: &Layer) -> Assignment {
    assign_where(coarse, fine, |_| None)
}

/// Match fine regions against the coarse layer, except those for which `preset` already
/// yields a match.
pub(crate) fn assign_where(coarse: &Layer, fine: &Layer, preset: impl Fn(usize) -> Option<Match>) -> Assignment {
    let mut failures = Vec::new();
    let matches = (0..fine.len())
        .map(|i| {
            if let Some(found) = preset(i) { return Some(found) }
            match match_region(coarse, fine.shape(i)) {
                Ok(found) => Some(found),
                Err(error) => {
                    debug!(fine = fine.name(), region = %fine.label(i), %error, "skipping region");
                    failures.push(RegionFailure::new(i, fine.label(i), error));
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let nearest = matches.iter().flatten().filter(|m| matches!(m.kind, MatchKind::Nearest { .. })).count();
    info!(
        coarse = coarse.name(), fine = fine.name(),
        regions = matches.len(), nearest, failed = failures.len(),
        "assigned fine regions to coarse regions"
    );

    Assignment::new(matches, failures)
}

/// Check the attribute lists of a distribute call before any geometry is touched.
pub(crate) fn check_attrs<'a>(
    coarse: &Layer, coarse_attrs: &[&'a str], fine_attrs: Option<&[&'a str]>,
) -> Result<Vec<&'a str>> {
    let fine_attrs = fine_attrs.map_or_else(|| coarse_attrs.to_vec(), <[_]>::to_vec);
    ensure!(
        fine_attrs.len() == coarse_attrs.len(),
        "[distribute] {} coarse attributes but {} output attributes", coarse_attrs.len(), fine_attrs.len()
    );
    for attr in coarse_attrs {
        ensure!(coarse.has_column(attr), "[distribute] attribute '{attr}' not found in layer '{}'", coarse.name());
    }
    Ok(fine_attrs)
}

/// Copy `coarse_attrs` of each fine region's matched coarse region onto the fine layer
/// as `fine_attrs`. Unresolved regions get nulls. Existing columns are replaced.
pub(crate) fn copy_attrs(
    coarse: &Layer, coarse_attrs: &[&str], fine: &Layer, fine_attrs: &[&str], assignment: &Assignment,
) -> Result<Layer> {
    let mut layer = fine.clone();
    for (source, target) in coarse_attrs.iter().zip(fine_attrs) {
        let source = coarse.data().column(source)?;
        let values = assignment.matches().iter()
            .map(|m| match m {
                Some(m) => source.get(m.coarse),
                None => Ok(AnyValue::Null),
            })
            .collect::<PolarsResult<Vec<_>>>()?;

        layer = layer.with_column(
            Series::from_any_values_and_dtype((*target).into(), &values, source.dtype(), false)?
        )?;
    }
    Ok(layer)
}

/// Copy attributes from the best-matching coarse region onto each fine region.
///
/// `fine_attrs` names the output columns and defaults to `coarse_attrs`. Mismatched
/// lengths or a missing coarse attribute fail the whole call; geometric failures on
/// individual fine regions leave those regions null and are reported in the assignment.
pub fn distribute(coarse: &Layer, coarse_attrs: &[&str], fine: &Layer, fine_attrs: Option<&[&str]>) -> Result<Distributed> {
    let fine_attrs = check_attrs(coarse, coarse_attrs, fine_attrs)?;
    let assignment = assign(coarse, fine);
    let layer = copy_attrs(coarse, coarse_attrs, fine, &fine_attrs, &assignment)?;
    Ok(Distributed { layer, assignment })
}
