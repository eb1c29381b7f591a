use ndarray::{indices, Array4, ArrayView4, Zip};

use crate::error::{AdlError, Result};
use crate::layers::{AttentionGuidedDropout, NoiseDraw};

/// Largest disagreement between the analytical and numerical input gradients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientReport {
    pub max_abs_error: f32,
    pub max_relative_error: f32,
    pub checked: usize,
}

/// Compare `backward` against central differences of `sum(output * upstream)`.
///
/// The same noise draw is replayed for every evaluation so the stochastic
/// parts of the layer stay fixed. Inputs sitting on a drop-mask threshold or
/// on a ranking tie are non-differentiable and will show large errors.
pub fn input_gradient_check(
    layer: &mut AttentionGuidedDropout,
    input: ArrayView4<f32>,
    noise: &NoiseDraw,
    upstream: ArrayView4<f32>,
    epsilon: f32,
) -> Result<GradientReport> {
    if input.dim() != upstream.dim() {
        return Err(AdlError::shape_mismatch(
            format!("{:?}", input.dim()),
            format!("{:?}", upstream.dim()),
        ));
    }

    layer.forward_with_noise(input, noise)?;
    let analytical = layer.backward(upstream)?;

    let mut perturbed: Array4<f32> = input.to_owned();
    let mut max_abs_error = 0.0f32;
    let mut max_relative_error = 0.0f32;

    for index in indices(perturbed.raw_dim()) {
        let original = perturbed[index];

        perturbed[index] = original + epsilon;
        let output_plus = layer.forward_with_noise(perturbed.view(), noise)?;
        let loss_plus = weighted_sum(&output_plus.view(), &upstream);

        perturbed[index] = original - epsilon;
        let output_minus = layer.forward_with_noise(perturbed.view(), noise)?;
        let loss_minus = weighted_sum(&output_minus.view(), &upstream);

        perturbed[index] = original;

        let numerical = (loss_plus - loss_minus) / (2.0 * epsilon);
        let abs_error = (numerical - analytical[index]).abs();
        let relative_error = abs_error / (numerical.abs() + analytical[index].abs()).max(1.0);

        max_abs_error = max_abs_error.max(abs_error);
        max_relative_error = max_relative_error.max(relative_error);
    }

    // Leave the layer holding the trace of the unperturbed input
    layer.forward_with_noise(input, noise)?;

    Ok(GradientReport {
        max_abs_error,
        max_relative_error,
        checked: perturbed.len(),
    })
}

fn weighted_sum(output: &ArrayView4<f32>, upstream: &ArrayView4<f32>) -> f32 {
    let mut total = 0.0f32;
    Zip::from(output).and(upstream).for_each(|&o, &u| total += o * u);
    total
}
