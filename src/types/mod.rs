use ndarray::ArrayView4;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AdlError, Result};

/// Spatial and channel extent of a `(batch, height, width, channels)` feature map.
///
/// Bound once at construction; the batch dimension stays free per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FeatureShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Result<Self> {
        let shape = FeatureShape { height, width, channels };
        shape.validate()?;
        Ok(shape)
    }

    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 || self.channels == 0 {
            return Err(AdlError::invalid_parameter(
                "shape",
                format!("all dimensions must be greater than 0, got {}", self),
            ));
        }
        Ok(())
    }

    /// Number of spatial locations per sample
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Full 4-D dimension tuple for a given batch size
    pub fn with_batch(&self, batch: usize) -> (usize, usize, usize, usize) {
        (batch, self.height, self.width, self.channels)
    }

    /// Ensure an input's trailing three dimensions agree with this shape
    pub fn check(&self, input: &ArrayView4<f32>) -> Result<()> {
        let (batch, height, width, channels) = input.dim();
        if (height, width, channels) != (self.height, self.width, self.channels) {
            return Err(AdlError::shape_mismatch(
                format!("(_, {}, {}, {})", self.height, self.width, self.channels),
                format!("({}, {}, {}, {})", batch, height, width, channels),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(h={}, w={}, c={})", self.height, self.width, self.channels)
    }
}

/// Execution mode supplied by the caller on every forward pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

impl Mode {
    pub fn is_training(self) -> bool {
        self == Mode::Training
    }
}

impl From<bool> for Mode {
    fn from(training: bool) -> Self {
        if training {
            Mode::Training
        } else {
            Mode::Inference
        }
    }
}

/// Suppression component chosen by the per-call switch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Branch {
    /// Soft suppression by the sigmoid of the capacity map
    ImportanceMap,
    /// Hard suppression by the extreme-capacity mask
    DropMask,
}

impl Branch {
    /// Decode the floored switch value: `1.0` selects the drop mask
    pub fn from_switch(switch: f32) -> Self {
        if switch >= 1.0 {
            Branch::DropMask
        } else {
            Branch::ImportanceMap
        }
    }
}
