#![allow(dead_code)]

use geo::{Coord, MultiPolygon, Rect};
use polars::prelude::*;
use splitmap::Layer;

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
}

/// A layer whose regions are `(label, shape)` with only a label column.
pub fn layer(name: &str, label_col: &str, regions: Vec<(&str, MultiPolygon<f64>)>) -> Layer {
    let (labels, shapes): (Vec<_>, Vec<_>) = regions.into_iter().map(|(l, s)| (l.to_string(), s)).unzip();
    Layer::new(name, label_col, labels, shapes).unwrap()
}

/// A fine layer carrying a group column and a population column.
pub fn blocks(regions: Vec<(&str, &str, f64, MultiPolygon<f64>)>) -> Layer {
    let labels = regions.iter().map(|r| r.0).collect::<Vec<_>>();
    let groups = regions.iter().map(|r| r.1).collect::<Vec<_>>();
    let pops = regions.iter().map(|r| r.2).collect::<Vec<_>>();
    let shapes = regions.into_iter().map(|r| r.3).collect();

    let data = DataFrame::new(vec![
        Column::new("geoid".into(), labels),
        Column::new("county".into(), groups),
        Column::new("pop".into(), pops),
    ]).unwrap();
    Layer::from_frame("blocks", data, "geoid", shapes).unwrap()
}
