//! Attention-guided dropout for convolutional feature maps
//!
//! During training the layer multiplies its input by two factors:
//!
//! 1. a per-location map, chosen once per call between the sigmoid
//!    importance map (soft suppression) and the extreme-capacity drop mask
//!    (hard suppression), and
//! 2. a per-channel spatial map built from the descending ranking of the
//!    channel means, perturbed by inverted dropout.
//!
//! In inference mode the input passes through untouched.
//!
//! ```rust
//! use adl_dropout::config::AdlConfig;
//! use adl_dropout::layers::AttentionGuidedDropout;
//! use adl_dropout::types::{FeatureShape, Mode};
//! use ndarray::Array4;
//!
//! let shape = FeatureShape::new(8, 8, 4).unwrap();
//! let mut layer = AttentionGuidedDropout::new(shape, AdlConfig::default().with_seed(42)).unwrap();
//!
//! let input = Array4::from_elem((2, 8, 8, 4), 0.5f32);
//! let output = layer.forward(input.view(), Mode::Training).unwrap();
//! assert_eq!(output.dim(), (2, 8, 8, 4));
//! ```

use std::fs;
use std::path::Path;

use ndarray::{Array2, Array3, Array4, ArrayView4, Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::dropout::RankingDropout;
use super::maps;
use super::traits::FeatureLayer;
use crate::activations::sigmoid_derivative;
use crate::config::AdlConfig;
use crate::debug::numerical_check::scan_values;
use crate::error::{AdlError, Result};
use crate::types::{Branch, FeatureShape, Mode};

/// Random quantities consumed by one training forward pass
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseDraw {
    /// `(batch, channels)` ranking dropout mask: `0` or the survivor scale
    pub channel_keep: Array2<f32>,
    /// `0.0` selects the importance map, `1.0` the drop mask
    pub switch: f32,
}

impl NoiseDraw {
    /// A draw that keeps every ranked channel and takes the given branch
    pub fn deterministic(batch: usize, channels: usize, branch: Branch) -> Self {
        NoiseDraw {
            channel_keep: Array2::ones((batch, channels)),
            switch: match branch {
                Branch::ImportanceMap => 0.0,
                Branch::DropMask => 1.0,
            },
        }
    }

    pub fn branch(&self) -> Branch {
        Branch::from_switch(self.switch)
    }
}

/// Values retained from the last training forward for the backward pass
#[derive(Clone, Debug)]
struct TrainingCache {
    input: Array4<f32>,
    selected: Array3<f32>,
    spatial: Array2<f32>,
    channel_keep: Array2<f32>,
    order: Array2<usize>,
    branch: Branch,
}

#[derive(Clone, Debug)]
enum ForwardTrace {
    Passthrough,
    Training(TrainingCache),
}

#[derive(Serialize, Deserialize)]
struct LayerSnapshot {
    name: Option<String>,
    trainable: bool,
    shape: FeatureShape,
    config: AdlConfig,
}

/// Attention-guided dropout layer
#[derive(Clone, Debug)]
pub struct AttentionGuidedDropout {
    config: AdlConfig,
    shape: FeatureShape,
    name: Option<String>,
    trainable: bool,
    ranking_dropout: RankingDropout,
    rng: StdRng,
    trace: Option<ForwardTrace>,
}

impl AttentionGuidedDropout {
    /// Create a trainable, unnamed layer
    pub fn new(shape: FeatureShape, config: AdlConfig) -> Result<Self> {
        Self::with_metadata(shape, config, None, true)
    }

    /// Create a layer carrying host metadata
    pub fn with_metadata(
        shape: FeatureShape,
        config: AdlConfig,
        name: Option<String>,
        trainable: bool,
    ) -> Result<Self> {
        config.validate()?;
        shape.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(
            name = name.as_deref().unwrap_or("<unnamed>"),
            %shape,
            threshold = config.threshold,
            keep_prob = config.keep_prob,
            drop_rate = config.drop_rate,
            mask_combine = ?config.mask_combine,
            "built attention-guided dropout layer"
        );

        Ok(AttentionGuidedDropout {
            ranking_dropout: RankingDropout::new(config.drop_rate),
            config,
            shape,
            name,
            trainable,
            rng,
            trace: None,
        })
    }

    pub fn config(&self) -> &AdlConfig {
        &self.config
    }

    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    /// Probability of the drop-mask branch on a training call
    pub fn drop_prob(&self) -> f32 {
        self.config.drop_prob()
    }

    /// Restart the random stream from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Branch taken by the most recent training forward, if any
    pub fn last_branch(&self) -> Option<Branch> {
        match &self.trace {
            Some(ForwardTrace::Training(cache)) => Some(cache.branch),
            _ => None,
        }
    }

    /// Draw the ranking dropout mask, then the single branch switch
    pub fn sample_noise(&mut self, batch: usize) -> NoiseDraw {
        let channel_keep = self
            .ranking_dropout
            .sample_keep((batch, self.shape.channels), &mut self.rng);

        let drop_prob = self.drop_prob();
        let sample = Uniform::new(drop_prob, 1.0 + drop_prob).sample(&mut self.rng);

        NoiseDraw {
            channel_keep,
            switch: maps::switch_from_sample(sample),
        }
    }

    /// Forward pass; `mode` is supplied by the host on every call
    pub fn forward(&mut self, input: ArrayView4<f32>, mode: Mode) -> Result<Array4<f32>> {
        self.shape.check(&input)?;

        if !mode.is_training() {
            self.trace = Some(ForwardTrace::Passthrough);
            return Ok(input.to_owned());
        }

        let noise = self.sample_noise(input.len_of(Axis(0)));
        self.forward_with_noise(input, &noise)
    }

    /// Training forward pass with explicitly supplied randomness
    pub fn forward_with_noise(
        &mut self,
        input: ArrayView4<f32>,
        noise: &NoiseDraw,
    ) -> Result<Array4<f32>> {
        self.shape.check(&input)?;

        let (batch, _, _, channels) = input.dim();
        if noise.channel_keep.dim() != (batch, channels) {
            return Err(AdlError::shape_mismatch(
                format!("channel_keep ({}, {})", batch, channels),
                format!("channel_keep {:?}", noise.channel_keep.dim()),
            ));
        }
        if noise.switch != 0.0 && noise.switch != 1.0 {
            return Err(AdlError::invalid_parameter(
                "switch",
                format!("must be 0 or 1, got {}", noise.switch),
            ));
        }

        let means = maps::channel_means(&input);
        let (ranked, order) = maps::rank_channels(&means.view());
        let spatial = self
            .ranking_dropout
            .apply(&ranked.view(), &noise.channel_keep.view());

        let capacity = maps::capacity_map(&input);
        let importance = maps::importance_map(&capacity.view());
        let mask =
            maps::drop_mask(&capacity.view(), self.config.threshold, self.config.mask_combine);
        let selected = maps::select_component(&importance.view(), &mask.view(), noise.switch);

        let output = maps::apply_maps(&input, &selected.view(), &spatial.view());

        let branch = noise.branch();
        debug!(
            name = self.name().unwrap_or("<unnamed>"),
            batch,
            ?branch,
            "attention-guided dropout forward"
        );
        trace!(
            masked = mask.iter().filter(|&&m| m > 0.0).count(),
            doubled = mask.iter().filter(|&&m| m > 1.0).count(),
            locations = mask.len(),
            dropped_ranks = noise.channel_keep.iter().filter(|&&k| k == 0.0).count(),
            "drop mask statistics"
        );
        for issue in scan_values(&output) {
            warn!(?issue, "non-finite values in attention-guided dropout output");
        }

        self.trace = Some(ForwardTrace::Training(TrainingCache {
            input: input.to_owned(),
            selected,
            spatial,
            channel_keep: noise.channel_keep.clone(),
            order,
            branch,
        }));

        Ok(output)
    }

    /// Gradient of the loss with respect to the input of the last forward.
    ///
    /// The drop mask and the branch switch are piecewise constant, so only
    /// the spatial map and, on the importance branch, the sigmoid of the
    /// capacity map route gradient back into the input.
    pub fn backward(&self, grad_output: ArrayView4<f32>) -> Result<Array4<f32>> {
        let cache = match &self.trace {
            None => {
                return Err(AdlError::TrainingError(
                    "backward called before any forward pass".to_string(),
                ))
            }
            Some(ForwardTrace::Passthrough) => {
                self.shape.check(&grad_output)?;
                return Ok(grad_output.to_owned());
            }
            Some(ForwardTrace::Training(cache)) => cache,
        };

        let expected = self.shape.with_batch(cache.input.len_of(Axis(0)));
        if grad_output.dim() != expected {
            return Err(AdlError::shape_mismatch(
                format!("{:?}", expected),
                format!("{:?}", grad_output.dim()),
            ));
        }

        let (batch, height, width, channels) = grad_output.dim();
        let mut grad_input = Array4::zeros(grad_output.raw_dim());
        let mut grad_spatial = Array2::<f32>::zeros((batch, channels));
        let mut grad_selected = Array3::<f32>::zeros((batch, height, width));

        Zip::indexed(&mut grad_input)
            .and(&grad_output)
            .and(&cache.input)
            .for_each(|(b, h, w, c), gi, &g, &x| {
                let selected = cache.selected[[b, h, w]];
                let spatial = cache.spatial[[b, c]];
                *gi = g * selected * spatial;
                grad_spatial[[b, c]] += g * x * selected;
                grad_selected[[b, h, w]] += g * x * spatial;
            });

        // Spatial factors are ranked means: undo the dropout, then the sort
        let grad_ranked = self
            .ranking_dropout
            .backward(&grad_spatial.view(), &cache.channel_keep.view());
        let mut grad_means = Array2::<f32>::zeros((batch, channels));
        for b in 0..batch {
            for rank in 0..channels {
                grad_means[[b, cache.order[[b, rank]]]] += grad_ranked[[b, rank]];
            }
        }

        let area = (height * width) as f32;
        let grad_capacity = match cache.branch {
            Branch::ImportanceMap => Some(grad_selected * sigmoid_derivative(&cache.selected)),
            Branch::DropMask => None,
        };

        Zip::indexed(&mut grad_input).for_each(|(b, h, w, c), gi| {
            *gi += grad_means[[b, c]] / area;
            if let Some(grad_capacity) = &grad_capacity {
                *gi += grad_capacity[[b, h, w]] / channels as f32;
            }
        });

        Ok(grad_input)
    }

    /// Write name, trainability, shape and config with bincode
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = LayerSnapshot {
            name: self.name.clone(),
            trainable: self.trainable,
            shape: self.shape,
            config: self.config.clone(),
        };
        fs::write(path, bincode::serialize(&snapshot)?)?;
        Ok(())
    }

    /// Rebuild a saved layer; the RNG restarts from the stored seed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        let snapshot: LayerSnapshot = bincode::deserialize(&bytes)?;
        Self::with_metadata(snapshot.shape, snapshot.config, snapshot.name, snapshot.trainable)
    }
}

impl FeatureLayer for AttentionGuidedDropout {
    fn forward(&mut self, input: ArrayView4<f32>, mode: Mode) -> Result<Array4<f32>> {
        AttentionGuidedDropout::forward(self, input, mode)
    }

    fn backward(&self, grad_output: ArrayView4<f32>) -> Result<Array4<f32>> {
        AttentionGuidedDropout::backward(self, grad_output)
    }

    fn input_shape(&self) -> FeatureShape {
        self.shape
    }

    fn output_shape(&self) -> FeatureShape {
        self.shape
    }

    fn name(&self) -> Option<&str> {
        AttentionGuidedDropout::name(self)
    }

    fn trainable(&self) -> bool {
        self.trainable
    }

    fn clone_box(&self) -> Box<dyn FeatureLayer> {
        Box::new(self.clone())
    }
}
