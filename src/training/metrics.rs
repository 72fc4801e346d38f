use std::marker::PhantomData;
use std::ops::Range;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

use crate::taxonomy::LabelMap;

/// Share of examples whose argmax is correct at every level of the hierarchy.
pub struct PathAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    level_ranges: Vec<Range<usize>>,
    _b: PhantomData<B>,
}

#[derive(new)]
pub struct PathAccuracyInput<B: Backend> {
    outputs: Tensor<B, 2>,
    level_targets: Tensor<B, 2, Int>,
}

impl<B: Backend> PathAccuracyMetric<B> {
    pub fn new(labelmap: &LabelMap) -> Self {
        Self {
            state: NumericMetricState::default(),
            level_ranges: labelmap.level_ranges().to_vec(),
            _b: PhantomData,
        }
    }

    /// Fraction of rows predicted correctly at every level.
    pub fn path_accuracy(&self, outputs: Tensor<B, 2>, level_targets: Tensor<B, 2, Int>) -> f64 {
        let [batch_size, _] = outputs.dims();
        if batch_size == 0 {
            return 0.0;
        }

        let mut correct = Tensor::<B, 1, Int>::ones([batch_size], &outputs.device());

        for (level, range) in self.level_ranges.iter().enumerate() {
            let predictions = outputs
                .clone()
                .narrow(1, range.start, range.end - range.start)
                .argmax(1)
                .reshape([batch_size]);
            let targets = level_targets
                .clone()
                .narrow(1, level, 1)
                .reshape([batch_size]);

            correct = correct * predictions.equal(targets).int();
        }

        correct.sum().into_scalar().elem::<f64>() / batch_size as f64
    }
}

impl<B: Backend> Metric for PathAccuracyMetric<B> {
    type Input = PathAccuracyInput<B>;
    const NAME: &'static str = "Path Accuracy";

    fn update(&mut self, input: &PathAccuracyInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _] = input.outputs.dims();
        let accuracy = self.path_accuracy(input.outputs.clone(), input.level_targets.clone());

        self.state.update(
            100.0 * accuracy,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for PathAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
