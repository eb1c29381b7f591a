pub mod adl;
pub mod dropout;
pub mod maps;
pub mod traits;

pub use adl::{AttentionGuidedDropout, NoiseDraw};
pub use dropout::RankingDropout;
pub use traits::FeatureLayer;
