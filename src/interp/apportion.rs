use std::{collections::BTreeMap, sync::Arc};

use anyhow::{ensure, Result};
use geo::MultiPolygon;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::{
    geom::{checked_area, checked_bounds, intersection_area, GeometryError, SpatialIndex},
    interp::{Intersections, PairKey, PairTable, RegionFailure, Tolerances},
    layer::Layer,
};

/// Population of each intersection pair, plus the bookkeeping needed to judge its quality.
#[derive(Debug, Clone, Default)]
pub struct Apportionment {
    pops: PairTable,
    resolved: Vec<bool>,
    unapportioned: Vec<(usize, f64)>,
    failures: Vec<RegionFailure>,
}

impl Apportionment {
    /// Apportioned population per pair (zero pairs omitted).
    #[inline] pub fn pops(&self) -> &PairTable { &self.pops }

    #[inline] pub fn into_pops(self) -> PairTable { self.pops }

    /// Whether fine region `i` was fully placed: either its group was unsplit, or the
    /// pairs it was found in cover at least `1 - resolution` of its area.
    #[inline] pub fn is_resolved(&self, i: usize) -> bool { self.resolved[i] }

    /// Number of fully placed fine regions.
    pub fn resolved_count(&self) -> usize { self.resolved.iter().filter(|&&r| r).count() }

    /// Fine regions whose population could not be placed in any pair, with that population.
    #[inline] pub fn unapportioned(&self) -> &[(usize, f64)] { &self.unapportioned }

    /// Total population that could not be placed.
    pub fn unapportioned_total(&self) -> f64 { self.unapportioned.iter().map(|(_, pop)| pop).sum() }

    /// Fine regions skipped because of geometric failures.
    #[inline] pub fn failures(&self) -> &[RegionFailure] { &self.failures }
}

/// Apportion the population of `fine` across intersection pairs.
///
/// Each fine region belongs to the layer-A region named by its `group_col` value. A group
/// with a single pair (an A region not split by layer B) receives the whole group's
/// population without geometric work. In a split group each fine region's population is
/// divided between the pairs in proportion to the area it shares with each, rescaled so
/// the shares add up to exactly its population.
pub fn apportion(
    pairs: &Intersections, fine: &Layer, group_col: &str, pop_col: &str, tolerances: &Tolerances,
) -> Result<Apportionment> {
    apportion_with(pairs, fine, group_col, pop_col, tolerances, true)
}

/// Like [`apportion`], but runs the area computation for every group, split or not.
pub fn apportion_geometric(
    pairs: &Intersections, fine: &Layer, group_col: &str, pop_col: &str, tolerances: &Tolerances,
) -> Result<Apportionment> {
    apportion_with(pairs, fine, group_col, pop_col, tolerances, false)
}

fn apportion_with(
    pairs: &Intersections, fine: &Layer, group_col: &str, pop_col: &str, tolerances: &Tolerances, shortcut: bool,
) -> Result<Apportionment> {
    tolerances.validate()?;
    let pops = fine.numeric_column(pop_col)?;
    for (i, pop) in pops.iter().enumerate() {
        ensure!(
            pop.is_finite() && *pop >= 0.0,
            "[apportion] population '{pop_col}' of region '{}' must be non-negative, got {pop}", fine.label(i)
        );
    }

    let mut groups = BTreeMap::<Arc<str>, Vec<usize>>::new();
    let mut out = Apportionment { resolved: vec![false; fine.len()], ..Default::default() };
    for (i, group) in fine.text_column(group_col)?.into_iter().enumerate() {
        match group {
            Some(group) => groups.entry(group).or_default().push(i),
            None => out.unapportioned.push((i, pops[i])),
        }
    }

    let by_a = pairs.by_a();
    for (group, members) in &groups {
        let Some(parts) = by_a.get(group) else {
            debug!(group = %group, regions = members.len(), "group has no intersection pairs");
            out.unapportioned.extend(members.iter().map(|&i| (i, pops[i])));
            continue;
        };

        if shortcut && parts.len() == 1 {
            let key = parts[0].0;
            for &i in members {
                out.pops.add(key.clone(), pops[i]);
                out.resolved[i] = true;
            }
            continue;
        }

        let index = SpatialIndex::build(parts.iter().map(|(_, shape)| *shape));
        for &i in members {
            if pops[i] == 0.0 {
                out.resolved[i] = true;
                continue;
            }

            match shares(fine.shape(i), parts, &index, tolerances.resolution) {
                Ok(found) if found.is_empty() => {
                    debug!(region = %fine.label(i), group = %group, "region overlaps no pair of its group");
                    out.unapportioned.push((i, pops[i]));
                }
                Ok(found) => {
                    let covered = found.iter().map(|(_, fraction)| fraction).sum::<f64>();
                    for (k, fraction) in found {
                        out.pops.add(parts[k].0.clone(), pops[i] * fraction / covered);
                    }
                    out.resolved[i] = covered >= 1.0 - tolerances.resolution;
                }
                Err(error) => {
                    debug!(region = %fine.label(i), %error, "skipping region");
                    out.failures.push(RegionFailure::new(i, fine.label(i), error));
                    out.unapportioned.push((i, pops[i]));
                }
            }
        }
    }

    if !out.unapportioned.is_empty() {
        warn!(
            fine = fine.name(), regions = out.unapportioned.len(), population = out.unapportioned_total(),
            "population left unapportioned"
        );
    }
    info!(
        fine = fine.name(), pairs = out.pops.len(), resolved = out.resolved_count(), failed = out.failures.len(),
        "apportioned population"
    );

    Ok(out)
}

/// Fraction of `shape`'s area lying in each overlapping part, in part order.
///
/// Stops early once the fractions found reach `1 - resolution`; the remaining parts can
/// only hold slivers.
fn shares(
    shape: &MultiPolygon<f64>, parts: &[(&PairKey, &MultiPolygon<f64>)], index: &SpatialIndex, resolution: f64,
) -> Result<SmallVec<[(usize, f64); 4]>, GeometryError> {
    let area = checked_area(shape)?;
    let bbox = checked_bounds(shape)?;

    let mut found = SmallVec::new();
    let mut covered = 0.0;
    for k in index.query(&bbox) {
        let fraction = intersection_area(parts[k].1, shape)? / area;
        if fraction > 0.0 {
            found.push((k, fraction));
            covered += fraction;
            if covered >= 1.0 - resolution { break }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use geo::{Coord, Rect};
    use polars::prelude::*;

    use super::*;
    use crate::interp::intersect;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    fn blocks(shapes: Vec<MultiPolygon<f64>>, counties: Vec<&str>, pops: Vec<f64>) -> Layer {
        let labels = (0..shapes.len()).map(|i| format!("b{i}")).collect();
        Layer::new("blocks", "block", labels, shapes).unwrap()
            .with_column(Column::new("county".into(), counties)).unwrap()
            .with_column(Column::new("pop".into(), pops)).unwrap()
    }

    #[test]
    fn unsplit_group_takes_whole_population() {
        let pairs = Intersections::from_pairs([(PairKey::new("001", "1"), square(0.0, 0.0, 2.0, 2.0))]);
        let fine = blocks(
            vec![square(0.0, 0.0, 1.0, 1.0), square(1.0, 0.0, 2.0, 1.0), square(5.0, 5.0, 6.0, 6.0)],
            vec!["001", "001", "001"],
            vec![10.0, 20.0, 5.0],
        );

        let out = apportion(&pairs, &fine, "county", "pop", &Tolerances::default()).unwrap();

        // The shortcut trusts the group label, even for a block outside the pair geometry.
        assert_eq!(out.pops().get("001", "1"), Some(35.0));
        assert_eq!(out.resolved_count(), 3);
        assert!(out.unapportioned().is_empty());
    }

    #[test]
    fn split_block_is_divided_by_area() {
        let counties = Layer::new("counties", "county", vec!["001".into()], vec![square(0.0, 0.0, 2.0, 2.0)]).unwrap();
        let districts = Layer::new(
            "districts", "district",
            vec!["1".into(), "2".into()],
            vec![square(0.0, 0.0, 1.0, 2.0), square(1.0, 0.0, 2.0, 2.0)],
        ).unwrap();
        let fine = blocks(
            vec![square(0.0, 0.0, 0.5, 2.0), square(0.5, 0.0, 1.5, 2.0), square(1.5, 0.0, 2.0, 2.0)],
            vec!["001", "001", "001"],
            vec![10.0, 100.0, 0.0],
        );

        let pairs = intersect(&counties, &districts);
        let out = apportion(&pairs, &fine, "county", "pop", &Tolerances::default()).unwrap();

        assert!((out.pops().get("001", "1").unwrap() - 60.0).abs() < 1e-9);
        assert!((out.pops().get("001", "2").unwrap() - 50.0).abs() < 1e-9);
        assert!(out.is_resolved(1));
        assert!((out.pops().total() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_gap_is_rescaled() {
        // The pairs leave a gap over x in [1.0, 1.2]; the straddling block keeps all of its population.
        let pairs = Intersections::from_pairs([
            (PairKey::new("001", "1"), square(0.0, 0.0, 1.0, 1.0)),
            (PairKey::new("001", "2"), square(1.2, 0.0, 2.0, 1.0)),
        ]);
        let fine = blocks(vec![square(0.6, 0.0, 1.6, 1.0)], vec!["001"], vec![90.0]);

        let out = apportion(&pairs, &fine, "county", "pop", &Tolerances::default()).unwrap();

        assert!((out.pops().get("001", "1").unwrap() - 45.0).abs() < 1e-9);
        assert!((out.pops().get("001", "2").unwrap() - 45.0).abs() < 1e-9);
        assert!(!out.is_resolved(0));
    }

    #[test]
    fn unmatched_and_degenerate_regions_are_reported() {
        let pairs = Intersections::from_pairs([
            (PairKey::new("001", "1"), square(0.0, 0.0, 1.0, 1.0)),
            (PairKey::new("001", "2"), square(1.0, 0.0, 2.0, 1.0)),
        ]);
        let fine = blocks(
            vec![square(5.0, 5.0, 6.0, 6.0), MultiPolygon::new(vec![]), square(0.0, 0.0, 1.0, 1.0)],
            vec!["001", "001", "009"],
            vec![7.0, 3.0, 4.0],
        );

        let out = apportion(&pairs, &fine, "county", "pop", &Tolerances::default()).unwrap();

        assert!(out.pops().is_empty());
        assert_eq!(out.unapportioned().len(), 3);
        assert_eq!(out.unapportioned_total(), 14.0);
        assert_eq!(out.failures().len(), 1);
        assert_eq!(out.failures()[0].error, GeometryError::Empty);
    }

    #[test]
    fn negative_population_is_a_precondition_violation() {
        let pairs = Intersections::from_pairs([(PairKey::new("001", "1"), square(0.0, 0.0, 1.0, 1.0))]);
        let fine = blocks(vec![square(0.0, 0.0, 1.0, 1.0)], vec!["001"], vec![-1.0]);

        assert!(apportion(&pairs, &fine, "county", "pop", &Tolerances::default()).is_err());
        assert!(apportion(&pairs, &fine, "county", "missing", &Tolerances::default()).is_err());
        assert!(apportion(&pairs, &fine, "missing", "pop", &Tolerances::default()).is_err());
    }
}
