//! # adl-dropout - Attention-Guided Dropout for Convolutional Feature Maps
//!
//! A regularization layer for image classifiers. During training it
//! attenuates the most discriminative spatial activations of a
//! `(batch, height, width, channels)` feature map so the network learns to
//! rely on a broader set of activations. During inference it is the identity.
//!
//! ## Key Features
//!
//! - **Dual suppression**: one shared random switch per forward pass picks
//!   between a soft sigmoid importance map and a hard extreme-capacity mask
//! - **Channel ranking**: a spatial map from the ranked channel means,
//!   perturbed with inverted dropout
//! - **Backward pass**: input gradients for hosts that drive their own
//!   training loop
//! - **Reproducible**: seedable RNG, explicit noise draws for replay
//! - **Persistence**: JSON configs and bincode layer snapshots
//!
//! ## Quick Start
//!
//! ```rust
//! use adl_dropout::builders::AdlLayerBuilder;
//! use adl_dropout::types::Mode;
//! use ndarray::Array4;
//!
//! let mut layer = AdlLayerBuilder::new()
//!     .input_shape(8, 8, 4)
//!     .seed(1234)
//!     .build()
//!     .unwrap();
//!
//! let features = Array4::from_elem((2, 8, 8, 4), 1.0f32);
//! let train_out = layer.forward(features.view(), Mode::Training).unwrap();
//! let eval_out = layer.forward(features.view(), Mode::Inference).unwrap();
//!
//! assert_eq!(train_out.dim(), features.dim());
//! assert_eq!(eval_out, features);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Sigmoid used for the importance map
//! - [`builders`] - Builder for the layer
//! - [`config`] - Hyperparameters, validation and JSON persistence
//! - [`debug`] - Gradient checking and non-finite value scans
//! - [`error`] - Error types and result handling
//! - [`layers`] - The layer, its tensor maps and the ranking dropout
//! - [`types`] - Feature shape, execution mode and branch identifiers

pub mod activations;
pub mod builders;
pub mod config;
pub mod debug;
pub mod error;
pub mod layers;
pub mod types;

#[cfg(feature = "python")]
pub mod bindings;

pub use config::{AdlConfig, MaskCombine};
pub use error::{AdlError, Result};
pub use layers::{AttentionGuidedDropout, FeatureLayer, NoiseDraw};
pub use types::{Branch, FeatureShape, Mode};

#[cfg(test)]
mod tests;
