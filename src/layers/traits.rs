use ndarray::{Array4, ArrayView4};

use crate::error::Result;
use crate::types::{FeatureShape, Mode};

/// Trait defining the interface for layers over `(batch, height, width, channels)` feature maps
pub trait FeatureLayer: Send + Sync {
    /// Perform forward propagation for a batch; the caller decides the mode
    fn forward(&mut self, input: ArrayView4<f32>, mode: Mode) -> Result<Array4<f32>>;

    /// Propagate the output gradient of the last forward back to its input
    fn backward(&self, grad_output: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Shape expected for every input, batch excluded
    fn input_shape(&self) -> FeatureShape;

    /// Shape of every output, batch excluded
    fn output_shape(&self) -> FeatureShape;

    /// Optional layer name forwarded from the host
    fn name(&self) -> Option<&str>;

    /// Host trainability flag
    fn trainable(&self) -> bool;

    /// Clone the layer into a boxed trait object
    fn clone_box(&self) -> Box<dyn FeatureLayer>;
}

impl Clone for Box<dyn FeatureLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
