use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::log_sigmoid,
};

use crate::taxonomy::HierarchyTargets;

/// Configuration to create a [MultiLabelSMLoss] using the [init function](MultiLabelSMLossConfig::init).
#[derive(Config, Debug)]
pub struct MultiLabelSMLossConfig {
    /// Optional per class rescaling weight, one value per output column.
    pub weights: Option<Vec<f32>>,
}

impl MultiLabelSMLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiLabelSMLoss<B> {
        tracing::info!("Using multi label soft margin loss with weights {:?}", self.weights);

        MultiLabelSMLoss {
            weights: self
                .weights
                .as_ref()
                .map(|e| Tensor::<B, 1>::from_floats(e.as_slice(), device)),
        }
    }
}

/// Multi-label one-versus-all soft margin loss.
///
/// Treats every class of the hierarchy as an independent binary decision and
/// ignores the level structure:
/// ```text
/// loss_n = -1/C * Σ_c w_c * (y_c * log σ(x_c) + (1 - y_c) * log σ(-x_c))
/// ```
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct MultiLabelSMLoss<B: Backend> {
    /// Weights for each class.
    pub weights: Option<Tensor<B, 1>>,
}

impl<B: Backend> ModuleDisplay for MultiLabelSMLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("weights", &self.weights).optional()
    }
}

impl<B: Backend> MultiLabelSMLoss<B> {
    /// Compute the criterion averaged over the batch.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, n_classes]`
    /// - targets: see [HierarchyTargets]; only `labels` is used
    /// - output: `[1]`
    pub fn forward(&self, outputs: Tensor<B, 2>, targets: &HierarchyTargets<B>) -> Tensor<B, 1> {
        self.forward_no_reduction(outputs, targets.labels.clone())
            .mean()
    }

    /// Compute the criterion for every example.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, n_classes]`
    /// - labels: `[batch_size, n_classes]` (0 or 1)
    /// - output: `[batch_size]`
    pub fn forward_no_reduction(&self, outputs: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        self.assertions(&outputs, &labels);

        let [batch_size, n_classes] = outputs.dims();

        let positive = labels.clone() * log_sigmoid(outputs.clone());
        let negative = labels.neg().add_scalar(1.0) * log_sigmoid(outputs.neg());
        let mut loss = (positive + negative).neg();

        if let Some(weights) = &self.weights {
            loss = loss * weights.clone().reshape([1, n_classes]);
        }

        loss.sum_dim(1).div_scalar(n_classes as f32).reshape([batch_size])
    }

    fn assertions(&self, outputs: &Tensor<B, 2>, labels: &Tensor<B, 2>) {
        let output_dims = outputs.dims();
        let label_dims = labels.dims();

        assert_eq!(
            output_dims, label_dims,
            "Shape mismatch: outputs ({:?}) vs labels ({:?})",
            output_dims, label_dims
        );

        if let Some(weights) = &self.weights {
            let [num_weights] = weights.dims();
            assert_eq!(
                num_weights, output_dims[1],
                "Class mismatch: outputs ({}) vs weights ({})",
                output_dims[1], num_weights
            );
        }
    }
}
