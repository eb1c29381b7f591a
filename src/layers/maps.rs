//! Tensor maps computed by the attention-guided dropout layer
//!
//! All functions here are pure: randomness is drawn by the layer and passed
//! in. Inputs follow the `(batch, height, width, channels)` layout.
//! Single-channel maps are returned as `(batch, height, width)` arrays and
//! per-channel vectors as `(batch, channels)` arrays; broadcasting happens in
//! [`apply_maps`].

use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};

use crate::activations::sigmoid;
use crate::config::MaskCombine;

/// Global average over height and width, one value per sample and channel
pub fn channel_means(input: &ArrayView4<f32>) -> Array2<f32> {
    let (_, height, width, _) = input.dim();
    let area = (height * width) as f32;
    input.sum_axis(Axis(1)).sum_axis(Axis(1)) / area
}

/// Sort each sample's channel means in descending order.
///
/// Returns the sorted values together with the source channel of every rank.
/// Ties keep ascending channel order.
pub fn rank_channels(means: &ArrayView2<f32>) -> (Array2<f32>, Array2<usize>) {
    let (batch, channels) = means.dim();
    let mut ranked = Array2::zeros((batch, channels));
    let mut order = Array2::zeros((batch, channels));

    for (b, row) in means.outer_iter().enumerate() {
        let mut indices: Vec<usize> = (0..channels).collect();
        indices.sort_by(|&lhs, &rhs| row[rhs].total_cmp(&row[lhs]));

        for (rank, &channel) in indices.iter().enumerate() {
            ranked[[b, rank]] = row[channel];
            order[[b, rank]] = channel;
        }
    }

    (ranked, order)
}

/// Tile per-channel factors across every spatial location
pub fn tile_spatial(factors: &ArrayView2<f32>, height: usize, width: usize) -> Array4<f32> {
    let (batch, channels) = factors.dim();
    Array4::from_shape_fn((batch, height, width, channels), |(b, _, _, c)| factors[[b, c]])
}

/// Average over channels, one value per spatial location
pub fn capacity_map(input: &ArrayView4<f32>) -> Array3<f32> {
    let channels = input.len_of(Axis(3)) as f32;
    input.sum_axis(Axis(3)) / channels
}

/// Sigmoid of the capacity map
pub fn importance_map(capacity: &ArrayView3<f32>) -> Array3<f32> {
    sigmoid(capacity)
}

/// Flag the weakest and strongest locations of each sample.
///
/// With `max` the per-sample maximum capacity and `t = max * threshold`, a
/// location scores one for `value < t` and one for `value > max - t`.
/// Under [`MaskCombine::Sum`] both scores add, so a location can reach `2.0`
/// when `threshold > 0.5` and `max > 0`.
pub fn drop_mask(capacity: &ArrayView3<f32>, threshold: f32, combine: MaskCombine) -> Array3<f32> {
    let mut mask = Array3::zeros(capacity.raw_dim());

    for (sample, mut sample_mask) in capacity.outer_iter().zip(mask.outer_iter_mut()) {
        let max_val = sample.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let lower = max_val * threshold;
        let upper = max_val - lower;

        sample_mask.zip_mut_with(&sample, |m, &v| {
            let weak = if v < lower { 1.0 } else { 0.0 };
            let strong = if v > upper { 1.0 } else { 0.0 };
            *m = match combine {
                MaskCombine::Sum => weak + strong,
                MaskCombine::Union => f32::max(weak, strong),
            };
        });
    }

    mask
}

/// Turn one uniform sample from `[drop_prob, 1 + drop_prob)` into a `{0, 1}` switch
pub fn switch_from_sample(sample: f32) -> f32 {
    sample.floor()
}

/// Blend the two components: `(1 - switch) * importance + switch * mask`
pub fn select_component(
    importance: &ArrayView3<f32>,
    mask: &ArrayView3<f32>,
    switch: f32,
) -> Array3<f32> {
    let mut selected = importance.mapv(|v| v * (1.0 - switch));
    selected.zip_mut_with(mask, |s, &m| *s += m * switch);
    selected
}

/// `input * selected * spatial`, broadcasting the single-channel selected map
/// over channels and the per-channel spatial factors over locations
pub fn apply_maps(
    input: &ArrayView4<f32>,
    selected: &ArrayView3<f32>,
    spatial: &ArrayView2<f32>,
) -> Array4<f32> {
    let mut output = input.to_owned();
    Zip::indexed(&mut output).for_each(|(b, h, w, c), v| {
        *v = *v * selected[[b, h, w]] * spatial[[b, c]];
    });
    output
}
