use crate::config::{AdlConfig, MaskCombine};
use crate::error::{AdlError, Result};
use crate::layers::AttentionGuidedDropout;
use crate::types::FeatureShape;

/// Builder for AttentionGuidedDropout
///
/// ```rust
/// use adl_dropout::builders::AdlLayerBuilder;
///
/// let layer = AdlLayerBuilder::new()
///     .input_shape(14, 14, 256)
///     .threshold(0.3)
///     .name("adl_block4")
///     .seed(0)
///     .build()
///     .unwrap();
/// assert_eq!(layer.name(), Some("adl_block4"));
/// ```
pub struct AdlLayerBuilder {
    height: Option<usize>,
    width: Option<usize>,
    channels: Option<usize>,
    config: AdlConfig,
    name: Option<String>,
    trainable: bool,
}

impl AdlLayerBuilder {
    /// Create a new builder holding the published defaults
    pub fn new() -> Self {
        AdlLayerBuilder {
            height: None,
            width: None,
            channels: None,
            config: AdlConfig::default(),
            name: None,
            trainable: true,
        }
    }

    /// Set height, width and channels at once
    pub fn input_shape(mut self, height: usize, width: usize, channels: usize) -> Self {
        self.height = Some(height);
        self.width = Some(width);
        self.channels = Some(channels);
        self
    }

    pub fn height(mut self, height: usize) -> Self {
        self.height = Some(height);
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Replace every hyperparameter at once
    pub fn config(mut self, config: AdlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn keep_prob(mut self, keep_prob: f32) -> Self {
        self.config.keep_prob = keep_prob;
        self
    }

    pub fn drop_rate(mut self, drop_rate: f32) -> Self {
        self.config.drop_rate = drop_rate;
        self
    }

    pub fn mask_combine(mut self, mask_combine: MaskCombine) -> Self {
        self.config.mask_combine = mask_combine;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    /// Build the layer
    pub fn build(self) -> Result<AttentionGuidedDropout> {
        let height = self
            .height
            .ok_or_else(|| AdlError::invalid_parameter("height", "Height not specified"))?;
        let width = self
            .width
            .ok_or_else(|| AdlError::invalid_parameter("width", "Width not specified"))?;
        let channels = self
            .channels
            .ok_or_else(|| AdlError::invalid_parameter("channels", "Channel count not specified"))?;

        let shape = FeatureShape::new(height, width, channels)?;
        AttentionGuidedDropout::with_metadata(shape, self.config, self.name, self.trainable)
    }
}

impl Default for AdlLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
