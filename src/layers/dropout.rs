use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inverted dropout over the ranked channel means
///
/// Each entry is zeroed with probability `rate`; survivors are scaled by
/// `1 / (1 - rate)` so the expected value is unchanged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RankingDropout {
    /// Dropout probability (probability of dropping an entry)
    pub rate: f32,
}

impl RankingDropout {
    pub fn new(rate: f32) -> Self {
        RankingDropout { rate }
    }

    /// Scale applied to surviving entries
    pub fn scale(&self) -> f32 {
        1.0 / (1.0 - self.rate)
    }

    /// Draw a keep mask holding either `0` or the survivor scale
    pub fn sample_keep<R: Rng + ?Sized>(&self, dim: (usize, usize), rng: &mut R) -> Array2<f32> {
        if self.rate == 0.0 {
            return Array2::ones(dim);
        }

        let scale = self.scale();
        let rate = self.rate;
        Array2::random_using(dim, Uniform::new(0.0f32, 1.0), rng)
            .mapv(|u| if u >= rate { scale } else { 0.0 })
    }

    /// Apply a previously drawn keep mask
    pub fn apply(&self, values: &ArrayView2<f32>, keep: &ArrayView2<f32>) -> Array2<f32> {
        values * keep
    }

    /// Gradient of [`RankingDropout::apply`] with respect to its values
    pub fn backward(&self, grad_output: &ArrayView2<f32>, keep: &ArrayView2<f32>) -> Array2<f32> {
        grad_output * keep
    }
}
