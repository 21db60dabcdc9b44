use anyhow::{ensure, Result};
use tracing::debug;

use crate::{
    geom::{intersection_area, GeometryError},
    layer::Layer,
};

/// Region positions sorted by bounding box: left edge, bottom edge, right edge, top edge.
/// Row order only decides between regions with identical boxes.
fn left_to_right(layer: &Layer) -> Result<Vec<usize>, GeometryError> {
    let mut keyed = (0..layer.len())
        .map(|i| layer.geoms().bbox(i).map(|bbox| ([bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y], i)))
        .collect::<Result<Vec<_>, _>>()?;

    keyed.sort_by(|(a, i), (b, j)| {
        a.iter().zip(b)
            .map(|(a, b)| a.total_cmp(b))
            .find(|order| order.is_ne())
            .unwrap_or(i.cmp(j))
    });
    Ok(keyed.into_iter().map(|(_, i)| i).collect())
}

/// Check every positional pair of regions for `area(x ∩ y)` within `1 ± precision` of both areas.
fn same_regions(x: &Layer, y: &Layer, precision: f64) -> Result<bool, GeometryError> {
    let within = |ratio: f64| (1.0 - precision..=1.0 + precision).contains(&ratio);

    for (i, j) in left_to_right(x)?.into_iter().zip(left_to_right(y)?) {
        let (area_x, area_y) = (x.geoms().area(i)?, y.geoms().area(j)?);
        let overlap = intersection_area(x.shape(i), y.shape(j))?;
        if !within(overlap / area_x) || !within(overlap / area_y) {
            debug!(x = %x.label(i), y = %y.label(j), overlap, "regions differ");
            return Ok(false)
        }
    }
    Ok(true)
}

/// Decide whether two vintages of the same plan type describe the same plan.
///
/// Layers with different region counts differ without any geometric work; two single-region
/// layers are the same. Otherwise regions are paired up by position after sorting each layer
/// left to right, and every pair must overlap within `1 ± precision` of both regions' areas.
/// Any geometric failure counts as "different".
pub fn same_plan(x: &Layer, y: &Layer, precision: f64) -> bool {
    if x.len() != y.len() || x.is_empty() { return false }
    if x.len() == 1 { return true }

    same_regions(x, y, precision).unwrap_or_else(|error| {
        debug!(x = x.name(), y = y.name(), %error, "geometric failure while comparing plans");
        false
    })
}

/// For an ordered series of vintages of one plan type, the position of the earliest vintage
/// each one is identical to.
///
/// Each vintage is compared to the most recent distinct vintage before it; a match maps it
/// there, otherwise it starts a new distinct plan. Results for a vintage can then be reused
/// for every later vintage mapped to it.
pub fn dedupe_vintages(vintages: &[&Layer], precision: f64) -> Result<Vec<usize>> {
    ensure!(
        precision.is_finite() && precision >= 0.0,
        "[dedupe_vintages] precision must be a non-negative number, got {precision}"
    );

    let mut canonical = Vec::with_capacity(vintages.len());
    let mut kept = 0;
    for (i, vintage) in vintages.iter().enumerate() {
        if i > 0 && same_plan(vintages[kept], vintage, precision) {
            debug!(kept = vintages[kept].name(), duplicate = vintage.name(), "vintage unchanged");
        } else {
            kept = i;
        }
        canonical.push(kept);
    }
    Ok(canonical)
}
