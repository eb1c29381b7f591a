//! Hyperparameters for the attention-guided dropout layer
//!
//! The defaults reproduce the published setup: a threshold of `0.25`, a keep
//! probability of `0.90` and a ranking dropout rate of `0.25`.
//!
//! ```rust
//! use adl_dropout::config::AdlConfig;
//!
//! let config = AdlConfig::default().with_threshold(0.3).with_seed(7);
//! assert!(config.validate().is_ok());
//! assert!((config.drop_prob() - 0.1).abs() < 1e-6);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdlError, Result};

/// How the "too weak" and "too strong" indicators of the drop mask combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaskCombine {
    /// Add both indicators. Locations satisfying both conditions get `2.0`.
    #[default]
    Sum,
    /// Logical OR of both indicators, the mask stays binary.
    Union,
}

/// Construction-time configuration. Immutable once a layer is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdlConfig {
    /// Fraction of the per-sample maximum capacity bounding both mask extremes
    pub threshold: f32,

    /// Probability of taking the importance-map branch
    pub keep_prob: f32,

    /// Dropout rate applied to the ranked channel means
    pub drop_rate: f32,

    /// Drop mask combination rule
    #[serde(default)]
    pub mask_combine: MaskCombine,

    /// Seed for the layer RNG; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AdlConfig {
    fn default() -> Self {
        AdlConfig {
            threshold: 0.25,
            keep_prob: 0.90,
            drop_rate: 0.25,
            mask_combine: MaskCombine::Sum,
            seed: None,
        }
    }
}

impl AdlConfig {
    pub fn new(threshold: f32, keep_prob: f32, drop_rate: f32) -> Result<Self> {
        let config = AdlConfig {
            threshold,
            keep_prob,
            drop_rate,
            ..AdlConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_keep_prob(mut self, keep_prob: f32) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    pub fn with_drop_rate(mut self, drop_rate: f32) -> Self {
        self.drop_rate = drop_rate;
        self
    }

    pub fn with_mask_combine(mut self, mask_combine: MaskCombine) -> Self {
        self.mask_combine = mask_combine;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Probability of taking the drop-mask branch
    pub fn drop_prob(&self) -> f32 {
        1.0 - self.keep_prob
    }

    /// Check every probability-typed field against its legal range.
    ///
    /// `keep_prob` accepts `1.0` so the drop-mask branch can be disabled.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold >= 1.0 {
            return Err(AdlError::invalid_parameter(
                "threshold",
                format!("must lie in (0, 1), got {}", self.threshold),
            ));
        }
        if !self.keep_prob.is_finite() || self.keep_prob <= 0.0 || self.keep_prob > 1.0 {
            return Err(AdlError::invalid_parameter(
                "keep_prob",
                format!("must lie in (0, 1], got {}", self.keep_prob),
            ));
        }
        if !self.drop_rate.is_finite() || self.drop_rate < 0.0 || self.drop_rate >= 1.0 {
            return Err(AdlError::invalid_parameter(
                "drop_rate",
                format!("must lie in [0, 1), got {}", self.drop_rate),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AdlConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a config stored as JSON
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
