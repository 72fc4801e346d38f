use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{Int, Transaction},
    train::metric::{Adaptor, ItemLazy, LossInput},
};
use derive_new::new;

use super::metrics::PathAccuracyInput;

/// Output of a hierarchical classification step.
///
/// `output` is a `[batch_size, n_classes]` score tensor laid out level by level:
/// the model logits for [MultiLevelCELoss](super::loss::MultiLevelCELoss) or the
/// derived distribution of [LastLevelCELoss](super::loss::LastLevelCELoss).
#[derive(new)]
pub struct HierarchyOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: Tensor<B, 2>,
    pub level_targets: Tensor<B, 2, Int>,
}

impl<B: Backend> ItemLazy for HierarchyOutput<B> {
    type ItemSync = HierarchyOutput<NdArray>;

    fn sync(self) -> Self::ItemSync {
        let [output, loss, level_targets] = Transaction::default()
            .register(self.output)
            .register(self.loss)
            .register(self.level_targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        let device = &Default::default();

        HierarchyOutput {
            output: Tensor::from_data(output, device),
            loss: Tensor::from_data(loss, device),
            level_targets: Tensor::from_data(level_targets, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for HierarchyOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<PathAccuracyInput<B>> for HierarchyOutput<B> {
    fn adapt(&self) -> PathAccuracyInput<B> {
        PathAccuracyInput::new(self.output.clone(), self.level_targets.clone())
    }
}
