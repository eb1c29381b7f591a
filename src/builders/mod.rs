pub mod layers;

pub use layers::AdlLayerBuilder;
