use std::{collections::BTreeMap, fmt::Display};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{info_span, warn};

/// Run `job` once per independent unit (a state, a plan-year pair, ...) on the rayon pool.
///
/// Units share nothing mutable, so each runs to completion on its own; a failing unit is
/// logged and reported in its slot without affecting the others. Results come back in key
/// order.
pub fn run<K, U, R, F>(units: &BTreeMap<K, U>, job: F) -> BTreeMap<K, Result<R>>
where
    K: Ord + Clone + Display + Send + Sync,
    U: Sync,
    R: Send,
    F: Fn(&K, &U) -> Result<R> + Sync,
{
    units.par_iter()
        .map(|(key, unit)| {
            let _span = info_span!("unit", %key).entered();
            let result = job(key, unit);
            if let Err(error) = &result { warn!(%key, "unit failed: {error:#}") }
            (key.clone(), result)
        })
        .collect()
}
