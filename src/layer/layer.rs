use std::sync::{Arc, OnceLock};

use ahash::AHashMap;
use anyhow::{ensure, Context, Result};
use geo::MultiPolygon;
use polars::prelude::*;

use crate::geom::Geometries;

/// A boundary layer: one classification scheme (e.g. "2016 congressional districts")
/// partitioning a territory into labelled regions.
///
/// Region `i` has label `labels[i]`, geometry `geoms.shape(i)` and attribute row `i`
/// of `data`. The label column is one of the attribute columns. Layers are never
/// mutated; adding a column produces a new layer sharing the same geometry.
#[derive(Debug, Clone)]
pub struct Layer {
    name: Arc<str>,
    label_col: Arc<str>,
    labels: Vec<Arc<str>>,
    geoms: Arc<Geometries>,
    data: DataFrame,
    positions: OnceLock<AHashMap<Arc<str>, usize>>,
}

impl Layer {
    /// Build a layer from labels and shapes; the attribute table starts with just the label column.
    pub fn new(name: &str, label_col: &str, labels: Vec<String>, shapes: Vec<MultiPolygon<f64>>) -> Result<Self> {
        ensure!(
            labels.len() == shapes.len(),
            "[Layer.new] {} labels but {} shapes in layer '{name}'", labels.len(), shapes.len()
        );

        let data = DataFrame::new(vec![
            Column::new(label_col.into(), labels.iter().map(String::as_str).collect::<Vec<_>>()),
        ])?;

        Self::from_frame(name, data, label_col, shapes)
    }

    /// Build a layer from an existing attribute table, taking labels from `label_col`.
    pub fn from_frame(name: &str, data: DataFrame, label_col: &str, shapes: Vec<MultiPolygon<f64>>) -> Result<Self> {
        ensure!(
            data.height() == shapes.len(),
            "[Layer.from_frame] {} attribute rows but {} shapes in layer '{name}'", data.height(), shapes.len()
        );

        let labels = text_values(&data, label_col)?.into_iter().enumerate()
            .map(|(i, label)| label.with_context(|| format!("[Layer.from_frame] null label in row {i} of layer '{name}'")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.into(),
            label_col: label_col.into(),
            labels,
            geoms: Arc::new(Geometries::new(shapes)),
            data,
            positions: OnceLock::new(),
        })
    }

    /// Return a copy of this layer with `column` added (or replaced, if the name exists).
    pub fn with_column(&self, column: impl Into<Column>) -> Result<Self> {
        let column = column.into();
        ensure!(
            column.len() == self.len(),
            "[Layer.with_column] column '{}' has {} values, layer '{}' has {} regions",
            column.name(), column.len(), self.name, self.len()
        );

        let replaces_labels = column.name().as_str() == &*self.label_col;
        let mut data = self.data.clone();
        data.with_column(column)?;

        let labels = if replaces_labels {
            text_values(&data, &self.label_col)?.into_iter()
                .map(|label| label.context("[Layer.with_column] label column may not contain nulls"))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.labels.clone()
        };

        Ok(Self {
            name: self.name.clone(),
            label_col: self.label_col.clone(),
            labels,
            geoms: self.geoms.clone(),
            data,
            positions: OnceLock::new(),
        })
    }

    /// Get the layer name.
    #[inline] pub fn name(&self) -> &str { &self.name }

    /// Get the name of the label column.
    #[inline] pub fn label_col(&self) -> &str { &self.label_col }

    /// Get the number of regions.
    #[inline] pub fn len(&self) -> usize { self.labels.len() }

    /// Check if the layer has no regions.
    #[inline] pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    /// Get all region labels, in region order.
    #[inline] pub fn labels(&self) -> &[Arc<str>] { &self.labels }

    /// Get the label of region `i`.
    #[inline] pub fn label(&self, i: usize) -> &Arc<str> { &self.labels[i] }

    /// Get the geometry store.
    #[inline] pub fn geoms(&self) -> &Geometries { &self.geoms }

    /// Get the geometry of region `i`.
    #[inline] pub fn shape(&self, i: usize) -> &MultiPolygon<f64> { self.geoms.shape(i) }

    /// Get the attribute table.
    #[inline] pub fn data(&self) -> &DataFrame { &self.data }

    /// Check whether the attribute table has a column called `name`.
    #[inline] pub fn has_column(&self, name: &str) -> bool { self.data.column(name).is_ok() }

    /// Position of the first region labelled `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get_or_init(|| {
            let mut positions = AHashMap::with_capacity(self.labels.len());
            for (i, label) in self.labels.iter().enumerate() {
                positions.entry(label.clone()).or_insert(i);
            }
            positions
        }).get(label).copied()
    }

    /// Values of column `name` rendered as text (numeric codes are stringified).
    pub fn text_column(&self, name: &str) -> Result<Vec<Option<Arc<str>>>> {
        text_values(&self.data, name)
            .with_context(|| format!("[Layer.text_column] layer '{}'", self.name))
    }

    /// Values of column `name` as floats; nulls become zero.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let column = self.data.column(name)
            .with_context(|| format!("[Layer.numeric_column] column '{name}' not found in layer '{}'", self.name))?
            .cast(&DataType::Float64)?;

        Ok(column.f64()?.into_iter().map(|value| value.unwrap_or(0.0)).collect())
    }
}

/// Read a column as optional shared strings, casting non-string columns.
fn text_values(data: &DataFrame, name: &str) -> Result<Vec<Option<Arc<str>>>> {
    let column = data.column(name)
        .with_context(|| format!("column '{name}' not found"))?
        .cast(&DataType::String)?;

    Ok(column.str()?.into_iter().map(|value| value.map(Arc::from)).collect())
}
