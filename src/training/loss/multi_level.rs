//! Multi-level cross-entropy.
//!
//! Every level of the hierarchy is scored independently against its own slice of
//! the model outputs:
//! ```text
//! loss_n = Σ_i level_weights[i] * CE(outputs[n, start_i..stop_i], level_labels[n, i])
//! ```
//! Predictions that disagree across levels are not penalized.

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
};

use super::level::{LevelCrossEntropy, level_criteria};
use crate::taxonomy::{HierarchyTargets, LabelMap};

/// Configuration to create a [MultiLevelCELoss] using the [init function](MultiLevelCELossConfig::init).
#[derive(Config, Debug)]
pub struct MultiLevelCELossConfig {
    /// Weight of each level in the sum. Defaults to 1.0 for every level.
    pub level_weights: Option<Vec<f32>>,

    /// Class weights over the whole hierarchy, in flat order.
    pub weights: Option<Vec<f32>>,
}

impl MultiLevelCELossConfig {
    pub fn init<B: Backend>(&self, labelmap: &LabelMap, device: &B::Device) -> MultiLevelCELoss<B> {
        self.assertions(labelmap);

        let levels = labelmap.levels().to_vec();
        let level_weights = self
            .level_weights
            .clone()
            .unwrap_or_else(|| vec![1.0; levels.len()]);

        tracing::info!(
            "Using the following weights config for multi level cross entropy loss: {:?}",
            level_weights
        );

        MultiLevelCELoss {
            criteria: level_criteria(&levels, self.weights.as_deref(), true, device),
            level_start: labelmap.level_ranges().iter().map(|r| r.start).collect(),
            levels,
            level_weights,
        }
    }

    fn assertions(&self, labelmap: &LabelMap) {
        if let Some(level_weights) = self.level_weights.as_ref() {
            assert_eq!(
                level_weights.len(),
                labelmap.num_levels(),
                "Expected one weight per level ({}), got {}",
                labelmap.num_levels(),
                level_weights.len()
            );
        }
    }
}

/// Weighted sum of independent per-level cross-entropies.
///
/// Should be created using [MultiLevelCELossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct MultiLevelCELoss<B: Backend> {
    /// One criterion per level.
    pub criteria: Vec<LevelCrossEntropy<B>>,
    /// Number of classes at each level.
    pub levels: Vec<usize>,
    /// Flat index of the first class of each level.
    pub level_start: Vec<usize>,
    /// Weight of each level.
    pub level_weights: Vec<f32>,
}

impl<B: Backend> ModuleDisplay for MultiLevelCELoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("levels", &self.levels)
            .add("level_weights", &self.level_weights)
            .optional()
    }
}

impl<B: Backend> MultiLevelCELoss<B> {
    /// Compute the criterion and average it over the batch.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, n_classes]` (logits of every level, flat order)
    /// - targets: see [HierarchyTargets]; only `level_labels` is used
    /// - output: `[1]`
    pub fn forward(&self, outputs: Tensor<B, 2>, targets: &HierarchyTargets<B>) -> Tensor<B, 1> {
        self.forward_no_reduction(outputs, targets.level_labels.clone())
            .mean()
    }

    /// Compute the summed, level weighted loss of every example.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, n_classes]`
    /// - level_labels: `[batch_size, num_levels]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction(
        &self,
        outputs: Tensor<B, 2>,
        level_labels: Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        self.assertions(&outputs, &level_labels);

        let [batch_size, _] = outputs.dims();
        tracing::debug!("Multi level loss on outputs {:?}", outputs.dims());

        let mut loss = Tensor::<B, 1>::zeros([batch_size], &outputs.device());

        for (level, criterion) in self.criteria.iter().enumerate() {
            let predictions = outputs
                .clone()
                .narrow(1, self.level_start[level], self.levels[level]);
            let targets = level_labels
                .clone()
                .narrow(1, level, 1)
                .reshape([batch_size]);

            loss = loss
                + criterion
                    .forward_no_reduction(predictions, targets)
                    .mul_scalar(self.level_weights[level]);
        }

        loss
    }

    fn assertions(&self, outputs: &Tensor<B, 2>, level_labels: &Tensor<B, 2, Int>) {
        let [output_batch, output_classes] = outputs.dims();
        let [label_batch, label_levels] = level_labels.dims();
        let n_classes: usize = self.levels.iter().sum();

        assert_eq!(
            output_batch, label_batch,
            "Batch size mismatch: outputs ({}) vs level labels ({})",
            output_batch, label_batch
        );

        assert_eq!(
            output_classes, n_classes,
            "Outputs should cover every class of the hierarchy ({}), got {}",
            n_classes, output_classes
        );

        assert_eq!(
            label_levels,
            self.levels.len(),
            "Level labels should have one column per level ({}), got {}",
            self.levels.len(),
            label_levels
        );
    }
}
