//! # Activation Functions Module
//!
//! The attention-guided dropout layer squashes its capacity map with a
//! sigmoid to obtain a soft importance map in `(0, 1)`. The helpers here work
//! on arrays of any dimension so the same code serves 3-D capacity maps and
//! plain vectors in tests.
//!
//! ```rust
//! use adl_dropout::activations::sigmoid;
//! use ndarray::array;
//!
//! let out = sigmoid(&array![0.0f32, 100.0, -100.0]);
//! assert_eq!(out[0], 0.5);
//! assert!(out[1] <= 1.0 && out[2] >= 0.0);
//! ```

pub mod functions;

pub use functions::{sigmoid, sigmoid_derivative, sigmoid_scalar};
