use ndarray::{array, Array2, Array4};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::sigmoid_scalar;
use crate::builders::AdlLayerBuilder;
use crate::config::{AdlConfig, MaskCombine};
use crate::debug::input_gradient_check;
use crate::error::AdlError;
use crate::layers::{AttentionGuidedDropout, FeatureLayer, NoiseDraw, RankingDropout};
use crate::types::{Branch, FeatureShape, Mode};

fn random_features(
    dim: (usize, usize, usize, usize),
    low: f32,
    high: f32,
    seed: u64,
) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::random_using(dim, Uniform::new(low, high), &mut rng)
}

fn build_layer(h: usize, w: usize, c: usize, config: AdlConfig) -> AttentionGuidedDropout {
    AttentionGuidedDropout::new(FeatureShape::new(h, w, c).unwrap(), config).unwrap()
}

/// Input whose capacity map is `base` and whose channel means sit 0.8 apart
fn descending_means_input() -> Array4<f32> {
    let base = array![[0.1f32, 0.5, 0.9], [0.3, 0.7, 1.1], [0.2, 0.6, 1.0]];
    Array4::from_shape_fn((1, 3, 3, 2), |(_, h, w, c)| {
        base[[h, w]] + if c == 0 { 0.4 } else { -0.4 }
    })
}

/// Same capacity map with the channels swapped, so the means ascend (0.2, 1.0)
fn ascending_means_input() -> Array4<f32> {
    let input = descending_means_input();
    Array4::from_shape_fn(input.raw_dim(), |(b, h, w, c)| input[[b, h, w, 1 - c]])
}

#[test]
fn test_inference_is_identity() {
    let mut layer = build_layer(8, 8, 4, AdlConfig::default().with_seed(1));
    let input = random_features((2, 8, 8, 4), -3.0, 3.0, 7);

    let output = layer.forward(input.view(), Mode::Inference).unwrap();
    assert_eq!(output, input);
    assert_eq!(layer.last_branch(), None);
}

#[test]
fn test_training_preserves_shape() {
    let mut layer = build_layer(8, 8, 4, AdlConfig::default());
    let input = random_features((2, 8, 8, 4), -1.0, 1.0, 3);

    let output = layer.forward(input.view(), Mode::Training).unwrap();
    assert_eq!(output.dim(), (2, 8, 8, 4));
    assert!(layer.last_branch().is_some());
}

#[test]
fn test_seeded_layers_are_deterministic() {
    let config = AdlConfig::default().with_seed(42);
    let input = random_features((2, 8, 8, 4), 0.0, 1.0, 9);

    let mut first = build_layer(8, 8, 4, config.clone());
    let mut second = build_layer(8, 8, 4, config);

    for _ in 0..5 {
        let a = first.forward(input.view(), Mode::Training).unwrap();
        let b = second.forward(input.view(), Mode::Training).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn test_reseed_restarts_stream() {
    let mut layer = build_layer(4, 4, 3, AdlConfig::default().with_seed(5));
    let input = random_features((3, 4, 4, 3), 0.0, 1.0, 2);

    let first = layer.forward(input.view(), Mode::Training).unwrap();
    layer.forward(input.view(), Mode::Training).unwrap();
    layer.reseed(5);
    let replay = layer.forward(input.view(), Mode::Training).unwrap();
    assert_eq!(first, replay);
}

#[test]
fn test_zero_drop_probability_never_selects_mask() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default().with_keep_prob(1.0).with_seed(17));
    let input = random_features((1, 2, 2, 2), 0.0, 1.0, 4);

    for _ in 0..1000 {
        layer.forward(input.view(), Mode::Training).unwrap();
        assert_eq!(layer.last_branch(), Some(Branch::ImportanceMap));
    }
}

#[test]
fn test_high_drop_probability_selects_mask() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default().with_keep_prob(0.001).with_seed(23));
    let input = random_features((1, 2, 2, 2), 0.0, 1.0, 4);

    let mut mask_count = 0;
    for _ in 0..1000 {
        layer.forward(input.view(), Mode::Training).unwrap();
        if layer.last_branch() == Some(Branch::DropMask) {
            mask_count += 1;
        }
    }
    assert!(mask_count >= 980, "drop mask chosen {} of 1000 times", mask_count);
}

#[test]
fn test_default_branch_frequency() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default().with_seed(99));
    let input = random_features((1, 2, 2, 2), 0.0, 1.0, 4);

    let mut mask_count = 0;
    for _ in 0..1000 {
        layer.forward(input.view(), Mode::Training).unwrap();
        if layer.last_branch() == Some(Branch::DropMask) {
            mask_count += 1;
        }
    }
    // drop_prob = 0.1
    assert!(mask_count > 50 && mask_count < 150, "drop mask chosen {} of 1000 times", mask_count);
}

#[test]
fn test_importance_branch_never_amplifies() {
    let config = AdlConfig::default().with_keep_prob(1.0).with_drop_rate(0.0).with_seed(8);
    let mut layer = build_layer(8, 8, 4, config);
    let input = random_features((2, 8, 8, 4), 0.0, 1.0, 12);

    for _ in 0..20 {
        let output = layer.forward(input.view(), Mode::Training).unwrap();
        for (&o, &x) in output.iter().zip(input.iter()) {
            assert!(o >= 0.0 && o <= x, "output {} escaped [0, {}]", o, x);
        }
    }
}

#[test]
fn test_drop_mask_branch_can_amplify() {
    // Threshold above 0.5 makes the two mask conditions overlap, giving 2.0
    let config = AdlConfig::default().with_threshold(0.75).with_drop_rate(0.0);
    let mut layer = build_layer(2, 2, 1, config);
    let input = Array4::from_shape_vec((1, 2, 2, 1), vec![0.9f32, 0.5, 0.6, 0.55]).unwrap();

    let masked = layer
        .forward_with_noise(input.view(), &NoiseDraw::deterministic(1, 1, Branch::DropMask))
        .unwrap();
    assert_eq!(layer.last_branch(), Some(Branch::DropMask));
    assert!(masked.iter().zip(input.iter()).any(|(&o, &x)| o > x));

    let soft = layer
        .forward_with_noise(input.view(), &NoiseDraw::deterministic(1, 1, Branch::ImportanceMap))
        .unwrap();
    assert_eq!(layer.last_branch(), Some(Branch::ImportanceMap));
    assert!(soft.iter().zip(input.iter()).all(|(&o, &x)| o <= x));
}

#[test]
fn test_union_mask_stays_binary() {
    let config = AdlConfig::default()
        .with_threshold(0.75)
        .with_drop_rate(0.0)
        .with_mask_combine(MaskCombine::Union);
    let mut layer = build_layer(2, 2, 1, config);
    let input = Array4::from_shape_vec((1, 2, 2, 1), vec![0.9f32, 0.5, 0.6, 0.55]).unwrap();

    let output = layer
        .forward_with_noise(input.view(), &NoiseDraw::deterministic(1, 1, Branch::DropMask))
        .unwrap();
    let mean = input.sum() / 4.0;
    for (&o, &x) in output.iter().zip(input.iter()) {
        assert!((o - x * mean).abs() < 1e-6);
    }
}

#[test]
fn test_shape_mismatch_rejected() {
    let mut layer = build_layer(8, 8, 4, AdlConfig::default());
    let wrong = Array4::<f32>::zeros((2, 8, 8, 3));

    for mode in [Mode::Training, Mode::Inference] {
        match layer.forward(wrong.view(), mode) {
            Err(AdlError::ShapeMismatch { .. }) => {}
            other => panic!("expected shape mismatch, got {:?}", other.map(|o| o.dim())),
        }
    }
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let shape = FeatureShape::new(4, 4, 2).unwrap();
    let result = AttentionGuidedDropout::new(shape, AdlConfig::default().with_threshold(1.2));
    assert!(matches!(result, Err(ref e) if e.is_configuration_error()));

    assert!(FeatureShape::new(0, 4, 2).is_err());
}

#[test]
fn test_noise_draw_validation() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default());
    let input = Array4::<f32>::ones((1, 2, 2, 2));

    let wrong_keep = NoiseDraw { channel_keep: Array2::ones((1, 3)), switch: 0.0 };
    assert!(matches!(
        layer.forward_with_noise(input.view(), &wrong_keep),
        Err(AdlError::ShapeMismatch { .. })
    ));

    let fractional = NoiseDraw { channel_keep: Array2::ones((1, 2)), switch: 0.5 };
    assert!(matches!(
        layer.forward_with_noise(input.view(), &fractional),
        Err(AdlError::InvalidParameter { .. })
    ));
}

#[test]
fn test_backward_requires_forward() {
    let layer = build_layer(2, 2, 2, AdlConfig::default());
    let grad = Array4::<f32>::ones((1, 2, 2, 2));
    assert!(matches!(layer.backward(grad.view()), Err(AdlError::TrainingError(_))));
}

#[test]
fn test_backward_after_inference_is_identity() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default());
    let input = random_features((3, 2, 2, 2), -1.0, 1.0, 1);
    layer.forward(input.view(), Mode::Inference).unwrap();

    let grad = random_features((3, 2, 2, 2), -1.0, 1.0, 2);
    assert_eq!(layer.backward(grad.view()).unwrap(), grad);
}

#[test]
fn test_backward_shape_mismatch() {
    let mut layer = build_layer(2, 2, 2, AdlConfig::default().with_seed(0));
    let input = Array4::<f32>::ones((2, 2, 2, 2));
    layer.forward(input.view(), Mode::Training).unwrap();

    let grad = Array4::<f32>::ones((1, 2, 2, 2));
    assert!(matches!(layer.backward(grad.view()), Err(AdlError::ShapeMismatch { .. })));
}

#[test]
fn test_gradient_check_importance_branch() {
    let mut layer = build_layer(3, 3, 2, AdlConfig::default());
    let input = descending_means_input();
    let upstream = Array4::from_shape_fn((1, 3, 3, 2), |(_, h, w, c)| {
        0.3 + 0.1 * (h + w) as f32 - 0.2 * c as f32
    });
    let noise = NoiseDraw { channel_keep: array![[4.0f32 / 3.0, 4.0 / 3.0]], switch: 0.0 };

    let report =
        input_gradient_check(&mut layer, input.view(), &noise, upstream.view(), 1e-2).unwrap();
    assert_eq!(report.checked, 18);
    assert!(report.max_abs_error < 1e-2, "max abs error {}", report.max_abs_error);
}

#[test]
fn test_gradient_check_drop_mask_branch() {
    let mut layer = build_layer(3, 3, 2, AdlConfig::default());
    let input = descending_means_input();
    let upstream = Array4::from_shape_fn((1, 3, 3, 2), |(_, h, w, c)| {
        0.5 - 0.1 * (h * 3 + w) as f32 + 0.3 * c as f32
    });
    let noise = NoiseDraw { channel_keep: array![[4.0f32 / 3.0, 0.0]], switch: 1.0 };

    let report =
        input_gradient_check(&mut layer, input.view(), &noise, upstream.view(), 1e-2).unwrap();
    assert!(report.max_abs_error < 1e-2, "max abs error {}", report.max_abs_error);
    assert_eq!(layer.last_branch(), Some(Branch::DropMask));
}

#[test]
fn test_ranked_means_align_with_channel_positions() {
    let mut layer = build_layer(3, 3, 2, AdlConfig::default());
    let input = ascending_means_input();
    let noise = NoiseDraw { channel_keep: Array2::ones((1, 2)), switch: 0.0 };

    let output = layer.forward_with_noise(input.view(), &noise).unwrap();

    // Channel 0 holds the smaller mean but receives the largest ranked factor
    let base = array![[0.1f32, 0.5, 0.9], [0.3, 0.7, 1.1], [0.2, 0.6, 1.0]];
    for h in 0..3 {
        for w in 0..3 {
            let importance = sigmoid_scalar(base[[h, w]]);
            let first = input[[0, h, w, 0]] * importance * 1.0;
            let second = input[[0, h, w, 1]] * importance * 0.2;
            assert!((output[[0, h, w, 0]] - first).abs() < 1e-5);
            assert!((output[[0, h, w, 1]] - second).abs() < 1e-5);
        }
    }
}

#[test]
fn test_gradient_check_importance_branch_reordered_channels() {
    let mut layer = build_layer(3, 3, 2, AdlConfig::default());
    let input = ascending_means_input();
    let upstream = Array4::from_shape_fn((1, 3, 3, 2), |(_, h, w, c)| {
        0.3 + 0.1 * (h + w) as f32 - 0.2 * c as f32
    });
    let noise = NoiseDraw { channel_keep: array![[4.0f32 / 3.0, 0.0]], switch: 0.0 };

    let report =
        input_gradient_check(&mut layer, input.view(), &noise, upstream.view(), 1e-2).unwrap();
    assert_eq!(report.checked, 18);
    assert!(report.max_abs_error < 1e-2, "max abs error {}", report.max_abs_error);
}

#[test]
fn test_gradient_check_drop_mask_branch_reordered_channels() {
    let mut layer = build_layer(3, 3, 2, AdlConfig::default());
    let input = ascending_means_input();
    let upstream = Array4::from_shape_fn((1, 3, 3, 2), |(_, h, w, c)| {
        0.5 - 0.1 * (h * 3 + w) as f32 + 0.3 * c as f32
    });
    let noise = NoiseDraw { channel_keep: array![[0.0f32, 4.0 / 3.0]], switch: 1.0 };

    let report =
        input_gradient_check(&mut layer, input.view(), &noise, upstream.view(), 1e-2).unwrap();
    assert!(report.max_abs_error < 1e-2, "max abs error {}", report.max_abs_error);
    assert_eq!(layer.last_branch(), Some(Branch::DropMask));
}

#[test]
fn test_inference_draws_no_randomness() {
    let input = random_features((2, 4, 4, 3), -1.0, 1.0, 21);
    let mut mixed = build_layer(4, 4, 3, AdlConfig::default().with_seed(9));
    let mut training_only = build_layer(4, 4, 3, AdlConfig::default().with_seed(9));

    mixed.forward(input.view(), Mode::Inference).unwrap();
    let after_inference = mixed.forward(input.view(), Mode::Training).unwrap();
    let fresh = training_only.forward(input.view(), Mode::Training).unwrap();

    assert_eq!(after_inference, fresh);
    assert_eq!(mixed.last_branch(), training_only.last_branch());
}

#[test]
fn test_feature_layer_trait_object() {
    let boxed: Box<dyn FeatureLayer> = Box::new(
        AdlLayerBuilder::new()
            .input_shape(4, 4, 2)
            .name("adl")
            .trainable(false)
            .seed(3)
            .build()
            .unwrap(),
    );
    let mut cloned = boxed.clone();

    assert_eq!(cloned.name(), Some("adl"));
    assert!(!cloned.trainable());
    assert_eq!(cloned.input_shape(), cloned.output_shape());

    let input = random_features((2, 4, 4, 2), 0.0, 1.0, 5);
    let output = cloned.forward(input.view(), Mode::Training).unwrap();
    let grad = cloned.backward(Array4::ones(output.raw_dim()).view()).unwrap();
    assert_eq!(grad.dim(), input.dim());
}

#[test]
fn test_builder_requires_shape() {
    let result = AdlLayerBuilder::new().height(4).width(4).build();
    match result {
        Err(AdlError::InvalidParameter { name, .. }) => assert_eq!(name, "channels"),
        other => panic!("expected missing channels, got {:?}", other.map(|l| l.shape())),
    }
}

#[test]
fn test_save_and_load_layer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adl.bin");

    let original = AdlLayerBuilder::new()
        .input_shape(4, 4, 3)
        .threshold(0.6)
        .mask_combine(MaskCombine::Union)
        .name("block3_adl")
        .seed(77)
        .build()
        .unwrap();
    original.save(&path).unwrap();

    let mut loaded = AttentionGuidedDropout::load(&path).unwrap();
    assert_eq!(loaded.config(), original.config());
    assert_eq!(loaded.shape(), original.shape());
    assert_eq!(loaded.name(), Some("block3_adl"));

    // Both restart from seed 77
    let mut fresh = original.clone();
    fresh.reseed(77);
    let input = random_features((2, 4, 4, 3), 0.0, 1.0, 6);
    assert_eq!(
        loaded.forward(input.view(), Mode::Training).unwrap(),
        fresh.forward(input.view(), Mode::Training).unwrap()
    );
}

#[test]
fn test_ranking_dropout() {
    let mut rng = StdRng::seed_from_u64(10);

    let dropout = RankingDropout::new(0.5);
    let keep = dropout.sample_keep((100, 10), &mut rng);
    let zero_count = keep.iter().filter(|&&k| k == 0.0).count();
    assert!(zero_count > 400 && zero_count < 600);
    assert!(keep.iter().all(|&k| k == 0.0 || k == 2.0));

    let passthrough = RankingDropout::new(0.0).sample_keep((4, 4), &mut rng);
    assert!(passthrough.iter().all(|&k| k == 1.0));
}
