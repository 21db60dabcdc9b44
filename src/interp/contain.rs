use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{ensure, Result};
use polars::prelude::*;
use tracing::{debug, info};

use crate::{
    geom::coverage,
    interp::{
        distribute::{assign, assign_where, check_attrs, copy_attrs},
        Distributed, Match, MatchKind, RegionFailure, Tolerances,
    },
    layer::Layer,
};

/// Whether one child region lies (within tolerance) inside its best-matching parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainmentRecord {
    /// Label of the child region.
    pub child: Arc<str>,
    /// Position of the containing parent region, if the child is contained.
    pub parent_index: Option<usize>,
    /// Value of the parent attribute for the containing parent, if any.
    pub parent: Option<Arc<str>>,
    /// `area(child ∩ best parent) / area(child)`; zero when no parent overlaps.
    pub ratio: f64,
}

/// Result of a containment pass of a child layer against a parent layer.
#[derive(Debug, Clone)]
pub struct Containment {
    /// The child layer with the parent attribute copied on (null where not contained).
    pub layer: Layer,
    parent_layer: Arc<str>,
    records: Vec<ContainmentRecord>,
    failures: Vec<RegionFailure>,
}

impl Containment {
    /// One record per child region, in child order.
    #[inline] pub fn records(&self) -> &[ContainmentRecord] { &self.records }

    /// Parent attribute value for child `i`, if contained.
    #[inline] pub fn parent(&self, i: usize) -> Option<&Arc<str>> { self.records[i].parent.as_ref() }

    /// Name of the parent layer this pass was run against.
    #[inline] pub fn parent_layer(&self) -> &str { &self.parent_layer }

    /// Number of children fully contained by a parent.
    pub fn contained_count(&self) -> usize { self.records.iter().filter(|r| r.parent_index.is_some()).count() }

    /// Child regions skipped because of geometric failures.
    #[inline] pub fn failures(&self) -> &[RegionFailure] { &self.failures }

    /// Containing parent position keyed by child label.
    pub fn parents_by_child(&self) -> AHashMap<Arc<str>, usize> {
        self.records.iter()
            .filter_map(|r| r.parent_index.map(|p| (r.child.clone(), p)))
            .collect()
    }
}

/// For each child region, find its best-matching parent and keep it only if the parent
/// covers at least `1 - tolerances.containment` of the child's area.
///
/// The parent's `parent_attr` value is written to the child layer as `child_attr`; children
/// that straddle a parent boundary get null and need full apportionment instead.
pub fn reduce(
    parent: &Layer, parent_attr: &str, child: &Layer, child_attr: &str, tolerances: &Tolerances,
) -> Result<Containment> {
    tolerances.validate()?;
    check_attrs(parent, &[parent_attr], Some([child_attr].as_slice()))?;
    let values = parent.text_column(parent_attr)?;

    let assignment = assign(parent, child);
    let mut failures = assignment.failures().to_vec();
    let records = assignment.matches().iter().enumerate()
        .map(|(i, found)| {
            let mut record = ContainmentRecord { child: child.label(i).clone(), parent_index: None, parent: None, ratio: 0.0 };
            let Some(found) = found else { return record };
            if matches!(found.kind, MatchKind::Nearest { .. }) { return record }

            match coverage(child.shape(i), parent.shape(found.coarse)) {
                Ok(ratio) => {
                    record.ratio = ratio;
                    if ratio >= 1.0 - tolerances.containment {
                        record.parent_index = Some(found.coarse);
                        record.parent = values[found.coarse].clone();
                    }
                }
                Err(error) => {
                    debug!(child = %child.label(i), %error, "skipping region");
                    failures.push(RegionFailure::new(i, child.label(i), error));
                }
            }
            record
        })
        .collect::<Vec<_>>();

    let layer = child.with_column(Column::new(
        child_attr.into(),
        records.iter().map(|r| r.parent.as_deref()).collect::<Vec<_>>(),
    ))?;

    let contained = records.iter().filter(|r| r.parent_index.is_some()).count();
    info!(parent = parent.name(), child = child.name(), contained, children = records.len(), "reduced containment");

    Ok(Containment { layer, parent_layer: parent.name().into(), records, failures })
}

/// Distribute `coarse_attr` onto `fine` as `fine_attr`, using a containment pass to skip
/// geometry where possible.
///
/// `containment` must come from [`reduce`] with `coarse` as the parent layer and a layer of
/// groups (e.g. counties) as the child layer. A fine region whose `group_attr` names a
/// contained group inherits that group's parent directly; every other fine region goes
/// through the regular best-match search.
pub fn distribute_staged(
    coarse: &Layer, coarse_attr: &str, fine: &Layer, fine_attr: &str, group_attr: &str, containment: &Containment,
) -> Result<Distributed> {
    ensure!(
        containment.parent_layer() == coarse.name(),
        "[distribute_staged] containment was computed against '{}', not '{}'", containment.parent_layer(), coarse.name()
    );
    let fine_attrs = check_attrs(coarse, &[coarse_attr], Some([fine_attr].as_slice()))?;
    let groups = fine.text_column(group_attr)?;
    let parents = containment.parents_by_child();

    let assignment = assign_where(coarse, fine, |i| {
        let parent = groups[i].as_ref().and_then(|group| parents.get(group))?;
        Some(Match { coarse: *parent, kind: MatchKind::Inherited })
    });

    let layer = copy_attrs(coarse, &[coarse_attr], fine, &fine_attrs, &assignment)?;
    Ok(Distributed { layer, assignment })
}
