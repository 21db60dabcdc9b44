mod dissolve;
mod layer;

pub use layer::Layer;
