use std::sync::Arc;

use crate::geom::GeometryError;

/// A region that could not be processed; the rest of the batch carried on without it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFailure {
    /// Position of the region in its layer.
    pub index: usize,
    /// Label of the region.
    pub label: Arc<str>,
    pub error: GeometryError,
}

impl RegionFailure {
    pub(crate) fn new(index: usize, label: &Arc<str>, error: GeometryError) -> Self {
        Self { index, label: label.clone(), error }
    }
}
