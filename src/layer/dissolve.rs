use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tracing::debug;

use super::Layer;

impl Layer {
    /// Union the regions of this layer by the value of `attr`, producing a coarser layer
    /// labelled by that attribute (counties from blocks, for example).
    ///
    /// Regions with a null `attr` are dropped. Output regions are sorted by label.
    pub fn dissolve(&self, attr: &str, name: &str) -> Result<Layer> {
        let mut groups = BTreeMap::<Arc<str>, Vec<usize>>::new();
        for (i, value) in self.text_column(attr)?.into_iter().enumerate() {
            match value {
                Some(value) => groups.entry(value).or_default().push(i),
                None => debug!(layer = self.name(), region = i, "dissolve: dropping region with null '{attr}'"),
            }
        }

        let (labels, shapes) = groups.iter()
            .map(|(label, members)| (label.to_string(), self.geoms().union_of(members)))
            .unzip();

        Layer::new(name, attr, labels, shapes)
    }
}

#[cfg(test)]
mod tests {
    use geo::{Area, Coord, MultiPolygon, Rect};
    use polars::prelude::*;

    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()])
    }

    #[test]
    fn dissolve_blocks_into_counties() {
        let blocks = Layer::new(
            "blocks", "block",
            vec!["b1".into(), "b2".into(), "b3".into(), "b4".into()],
            vec![
                square(0.0, 0.0, 1.0, 1.0),
                square(1.0, 0.0, 2.0, 1.0),
                square(2.0, 0.0, 3.0, 1.0),
                square(3.0, 0.0, 4.0, 1.0),
            ],
        ).unwrap()
        .with_column(Column::new("county".into(), vec![Some("002"), Some("001"), Some("002"), None]))
        .unwrap();

        let counties = blocks.dissolve("county", "counties").unwrap();

        assert_eq!(counties.len(), 2);
        assert_eq!(counties.label_col(), "county");
        assert_eq!(&**counties.label(0), "001");
        assert_eq!(&**counties.label(1), "002");
        assert!((counties.shape(0).unsigned_area() - 1.0).abs() < 1e-12);
        assert!((counties.shape(1).unsigned_area() - 2.0).abs() < 1e-12);
    }
}
