//! Per-level classification criterion.
//!
//! This is the unreduced counterpart of burn's `CrossEntropyLoss`: it returns one
//! loss value per example so that hierarchical losses can weight and sum levels
//! before the batch reduction.
//!
//! https://github.com/tracel-ai/burn/blob/v0.16.0/crates/burn-core/src/nn/loss/cross_entropy.rs

use std::ops::Range;

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::taxonomy::level_ranges;

/// Configuration to create a [LevelCrossEntropy] using the [init function](LevelCrossEntropyConfig::init).
#[derive(Config, Debug)]
pub struct LevelCrossEntropyConfig {
    /// Create weighted cross-entropy.
    ///
    /// The loss of a specific sample will be multiplied by the weight corresponding to the class label.
    ///
    /// # Pre-conditions
    ///   - The order of the weight vector should correspond to the local class index of the level.
    ///   - All weights must be positive.
    pub weights: Option<Vec<f32>>,

    /// Whether predictions are logits (cross-entropy) or log-probabilities
    /// (negative log-likelihood).
    #[config(default = true)]
    pub logits: bool,
}

impl LevelCrossEntropyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LevelCrossEntropy<B> {
        self.assertions();
        LevelCrossEntropy {
            weights: self
                .weights
                .as_ref()
                .map(|e| Tensor::<B, 1>::from_floats(e.as_slice(), device)),
            logits: self.logits,
        }
    }

    fn assertions(&self) {
        if let Some(weights) = self.weights.as_ref() {
            assert!(
                weights.iter().all(|e| e > &0.),
                "Weights of cross-entropy have to be positive."
            );
        }
    }
}

/// Build one criterion per level.
///
/// When `weights` is given it covers every class of the hierarchy (`sum(levels)`
/// entries, flat order) and level `i` receives the slice of its own flat range.
pub fn level_criteria<B: Backend>(
    levels: &[usize],
    weights: Option<&[f32]>,
    logits: bool,
    device: &B::Device,
) -> Vec<LevelCrossEntropy<B>> {
    let ranges = level_ranges(levels);
    let n_classes: usize = levels.iter().sum();

    if let Some(weights) = weights {
        assert_eq!(
            weights.len(),
            n_classes,
            "Class weights must cover every class of the hierarchy: expected {} values, got {}",
            n_classes,
            weights.len()
        );
    }

    ranges
        .into_iter()
        .map(|range: Range<usize>| {
            LevelCrossEntropyConfig::new()
                .with_weights(weights.map(|w| w[range].to_vec()))
                .with_logits(logits)
                .init(device)
        })
        .collect()
}

/// Cross-entropy of a single hierarchy level, without batch reduction.
///
/// Should be created using [LevelCrossEntropyConfig] or [level_criteria].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct LevelCrossEntropy<B: Backend> {
    /// Weights for cross-entropy.
    pub weights: Option<Tensor<B, 1>>,
    /// Use logits as input.
    pub logits: bool,
}

impl<B: Backend> ModuleDisplay for LevelCrossEntropy<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("weights", &self.weights)
            .add("logits", &self.logits)
            .optional()
    }
}

impl<B: Backend> LevelCrossEntropy<B> {
    /// Compute the criterion for every example.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, num_classes]`
    /// - targets: `[batch_size]` (local class indices)
    /// - output: `[batch_size]`
    pub fn forward_no_reduction(
        &self,
        predictions: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        self.assertions(&predictions, &targets);

        let [batch_size, _num_classes] = predictions.dims();

        let log_probs = if self.logits {
            log_softmax(predictions, 1)
        } else {
            predictions
        };

        let picked = log_probs
            .gather(1, targets.clone().reshape([batch_size, 1]))
            .reshape([batch_size]);

        let picked = match &self.weights {
            Some(weights) => picked * weights.clone().gather(0, targets),
            None => picked,
        };

        picked.neg()
    }

    /// Number of classes this criterion was weighted for, if any.
    pub fn num_weighted_classes(&self) -> Option<usize> {
        self.weights.as_ref().map(|w| w.dims()[0])
    }

    fn assertions(&self, predictions: &Tensor<B, 2>, targets: &Tensor<B, 1, Int>) {
        let [pred_batch, pred_classes] = predictions.dims();
        let [target_batch] = targets.dims();

        assert_eq!(
            pred_batch, target_batch,
            "Batch size mismatch: predictions ({}) vs targets ({})",
            pred_batch, target_batch
        );

        if let Some(num_weights) = self.num_weighted_classes() {
            assert_eq!(
                pred_classes, num_weights,
                "Class mismatch: predictions ({}) vs weights ({})",
                pred_classes, num_weights
            );
        }
    }
}
