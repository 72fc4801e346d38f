//! Bottom-up consistent cross-entropy.
//!
//! The model only predicts the leaf level. Leaf probabilities are propagated up the
//! taxonomy so that every parent receives the summed probability of its children,
//! and every level is then scored against that derived distribution:
//! ```text
//! p_leaf   = softmax(outputs)
//! p_parent = Σ_{c ∈ children(parent)} p_c
//! loss_n   = Σ_i level_weights[i] * NLL(log(max(p[n, start_i..stop_i], eps)), level_labels[n, i])
//! ```
//! By construction the mass of any ancestor equals the mass of its leaves.

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::softmax,
};

use super::level::{LevelCrossEntropy, level_criteria};
use crate::taxonomy::{HierarchyTargets, LabelMap};

/// Configuration to create a [LastLevelCELoss] using the [init function](LastLevelCELossConfig::init).
#[derive(Config, Debug)]
pub struct LastLevelCELossConfig {
    /// Weight of each level in the sum. Defaults to 1.0 for every level.
    pub level_weights: Option<Vec<f32>>,

    /// Class weights over the whole hierarchy, in flat order. Each level is
    /// weighted by the slice of its own classes.
    pub weights: Option<Vec<f32>>,

    /// Lower bound applied to derived probabilities before the logarithm.
    #[config(default = 1e-7)]
    pub eps: f64,
}

impl LastLevelCELossConfig {
    pub fn init<B: Backend>(&self, labelmap: &LabelMap, device: &B::Device) -> LastLevelCELoss<B> {
        self.assertions(labelmap);

        let levels = labelmap.levels().to_vec();
        let level_weights = self
            .level_weights
            .clone()
            .unwrap_or_else(|| vec![1.0; levels.len()]);

        tracing::info!(
            "Using the following weights config for last level cross entropy loss: {:?}",
            level_weights
        );

        let aggregations = (0..levels.len() - 1)
            .map(|level| Self::aggregation(labelmap, level, device))
            .collect();

        LastLevelCELoss {
            criteria: level_criteria(&levels, self.weights.as_deref(), false, device),
            aggregations,
            level_start: labelmap.level_ranges().iter().map(|r| r.start).collect(),
            level_stop: labelmap.level_ranges().iter().map(|r| r.end).collect(),
            levels,
            level_weights,
            eps: self.eps,
        }
    }

    /// Membership matrix of a non-leaf level, shape `[levels[level + 1], levels[level]]`.
    ///
    /// `A[c, p] = 1` when `c` is a child of `p`, so `children.matmul(A)` sums the
    /// children of every parent.
    fn aggregation<B: Backend>(labelmap: &LabelMap, level: usize, device: &B::Device) -> Tensor<B, 2> {
        let parents = labelmap.levels()[level];
        let children = labelmap.levels()[level + 1];

        let mut membership = vec![0.0f32; children * parents];
        for (parent, members) in labelmap.children(level).iter().enumerate() {
            for &child in members {
                membership[child * parents + parent] = 1.0;
            }
        }

        Tensor::<B, 2>::from_data(
            TensorData::new(membership, Shape::new([children, parents])).convert::<B::FloatElem>(),
            device,
        )
    }

    fn assertions(&self, labelmap: &LabelMap) {
        assert!(
            self.eps > 0.0 && self.eps < 1.0,
            "Epsilon of last level cross entropy should be in interval (0, 1). Got {}",
            self.eps
        );

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

/// Hierarchy consistent loss computed from leaf logits only.
///
/// Should be created using [LastLevelCELossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct LastLevelCELoss<B: Backend> {
    /// One negative log-likelihood criterion per level.
    pub criteria: Vec<LevelCrossEntropy<B>>,
    /// Child to parent membership matrix of every non-leaf level.
    pub aggregations: Vec<Tensor<B, 2>>,
    /// Number of classes at each level.
    pub levels: Vec<usize>,
    /// Flat index of the first class of each level.
    pub level_start: Vec<usize>,
    /// Flat index one past the last class of each level.
    pub level_stop: Vec<usize>,
    /// Weight of each level.
    pub level_weights: Vec<f32>,
    /// Probability floor before the logarithm.
    pub eps: f64,
}

impl<B: Backend> ModuleDisplay for LastLevelCELoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("levels", &self.levels)
            .add("level_weights", &self.level_weights)
            .add("eps", &self.eps)
            .optional()
    }
}

impl<B: Backend> LastLevelCELoss<B> {
    /// Compute the derived distribution and the loss averaged over the batch.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, levels[-1]]` (leaf logits)
    /// - targets: see [HierarchyTargets]; only `level_labels` is used
    /// - output: (`[batch_size, n_classes]`, `[1]`)
    pub fn forward(
        &self,
        outputs: Tensor<B, 2>,
        targets: &HierarchyTargets<B>,
    ) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let (distribution, loss) =
            self.forward_no_reduction(outputs, targets.level_labels.clone());

        (distribution, loss.mean())
    }

    /// Compute the derived distribution and the loss of every example.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, levels[-1]]`
    /// - level_labels: `[batch_size, num_levels]`
    /// - output: (`[batch_size, n_classes]`, `[batch_size]`)
    pub fn forward_no_reduction(
        &self,
        outputs: Tensor<B, 2>,
        level_labels: Tensor<B, 2, Int>,
    ) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let [batch_size, _] = outputs.dims();
        let [label_batch, label_levels] = level_labels.dims();

        assert_eq!(
            batch_size, label_batch,
            "Batch size mismatch: outputs ({}) vs level labels ({})",
            batch_size, label_batch
        );
        assert_eq!(
            label_levels,
            self.levels.len(),
            "Level labels should have one column per level ({}), got {}",
            self.levels.len(),
            label_levels
        );

        let distribution = self.forward_distribution(outputs);

        // Ensure we have no log(0) later
        let log_probs = distribution.clone().clamp_min(self.eps).log();

        let mut loss = Tensor::<B, 1>::zeros([batch_size], &log_probs.device());

        for (level, criterion) in self.criteria.iter().enumerate() {
            let predictions = log_probs
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

        (distribution, loss)
    }

    /// Propagate leaf probabilities up the taxonomy.
    ///
    /// # Shapes
    ///
    /// - outputs: `[batch_size, levels[-1]]`
    /// - output: `[batch_size, n_classes]`, levels laid out in flat order
    pub fn forward_distribution(&self, outputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let [_, leaves] = outputs.dims();
        let leaf_level = self.levels.len() - 1;

        assert_eq!(
            leaves, self.levels[leaf_level],
            "Outputs should hold the leaf level logits ({}), got {}",
            self.levels[leaf_level], leaves
        );

        tracing::debug!(
            "Propagating {} leaf probabilities over {} levels",
            leaves,
            self.levels.len()
        );

        let mut probs = softmax(outputs, 1);
        let mut blocks = Vec::with_capacity(self.levels.len());
        blocks.push(probs.clone());

        for aggregation in self.aggregations.iter().rev() {
            probs = probs.matmul(aggregation.clone());
            blocks.push(probs.clone());
        }
        blocks.reverse();

        let distribution = Tensor::cat(blocks, 1);
        debug_assert_eq!(distribution.dims()[1], self.level_stop[leaf_level]);

        distribution
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};

    use super::*;
    use crate::taxonomy::{proportional_labelmap, small_labelmap};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn leaf_outputs(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::<TestBackend, 2>::from_data(
            TensorData::from([
                [0.2f32, -1.0, 0.4, 1.3, 0.0, -0.7, 2.1, 0.5],
                [1.5, 0.3, -0.2, 0.0, 0.9, -1.1, 0.6, 0.1],
            ]),
            device,
        )
    }

    #[test]
    fn derived_distribution_conserves_mass() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let loss = LastLevelCELossConfig::new().init::<TestBackend>(&labelmap, &device);

        let distribution = loss.forward_distribution(leaf_outputs(&device));
        assert_eq!(distribution.dims(), [2, 15]);

        let values = distribution.into_data().to_vec::<f32>().unwrap();
        for row in values.chunks(15) {
            let leaf_mass: f32 = row[labelmap.level_start(2)..].iter().sum();
            assert!((leaf_mass - 1.0).abs() < 1e-5);

            for level in 0..2 {
                for (parent, children) in labelmap.children(level).iter().enumerate() {
                    let parent_mass = row[labelmap.level_start(level) + parent];
                    let children_mass: f32 = children
                        .iter()
                        .map(|&c| row[labelmap.level_start(level + 1) + c])
                        .sum();
                    assert!((parent_mass - children_mass).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn confident_leaf_lights_up_its_ancestors() {
        let device = Default::default();
        let labelmap = proportional_labelmap(&[8, 90, 300, 600]);
        let loss = LastLevelCELossConfig::new().init::<TestBackend>(&labelmap, &device);

        let leaf = 421;
        let path = labelmap.path_to_leaf(leaf).unwrap();

        let mut logits = vec![0.0f32; 600];
        logits[leaf] = 10000.0;
        let outputs =
            Tensor::<TestBackend, 2>::from_data(TensorData::new(logits, Shape::new([1, 600])), &device);

        let matching = HierarchyTargets::from_paths(&labelmap, &[path.clone()], &device).unwrap();
        let (distribution, matching_loss) = loss.forward(outputs.clone(), &matching);

        let values = distribution.into_data().to_vec::<f32>().unwrap();
        for (level, &local) in path.iter().enumerate() {
            let range = labelmap.level_ranges()[level].clone();
            for (index, value) in values[range].iter().enumerate() {
                let expected = if index == local { 1.0 } else { 0.0 };
                assert!((value - expected).abs() < 1e-5, "level {level} class {index}: {value}");
            }
        }
        assert!(matching_loss.into_scalar().abs() < 1e-4);

        let other_leaf = 3;
        let wrong = HierarchyTargets::from_leaves(&labelmap, &[other_leaf], &device).unwrap();
        let (_, wrong_loss) = loss.forward(outputs, &wrong);
        let wrong_loss = wrong_loss.into_scalar();

        // Every level misses and is floored at eps.
        let floor = -(1e-7f64.ln()) as f32 * 4.0;
        assert!(wrong_loss.is_finite());
        assert!((wrong_loss - floor).abs() < 1e-2, "{wrong_loss} != {floor}");
    }

    #[test]
    fn loss_matches_negative_log_of_derived_probabilities() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let loss = LastLevelCELossConfig::new()
            .with_level_weights(Some(vec![0.5, 1.0, 2.0]))
            .init::<TestBackend>(&labelmap, &device);
        let path = vec![1, 3, 5];
        let targets = HierarchyTargets::from_paths(&labelmap, &[path.clone()], &device).unwrap();

        let (distribution, value) =
            loss.forward(leaf_outputs(&device).narrow(0, 0, 1), &targets);
        let row = distribution.into_data().to_vec::<f32>().unwrap();

        let expected = -0.5 * row[path[0]].ln()
            - 1.0 * row[labelmap.level_start(1) + path[1]].ln()
            - 2.0 * row[labelmap.level_start(2) + path[2]].ln();

        assert!((value.into_scalar() - expected).abs() < 1e-4);
    }

    #[test]
    fn default_level_weights_match_explicit_ones() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let targets =
            HierarchyTargets::from_paths(&labelmap, &[vec![1, 4, 6], vec![0, 1, 2]], &device).unwrap();

        let (_, implicit) = LastLevelCELossConfig::new()
            .init::<TestBackend>(&labelmap, &device)
            .forward(leaf_outputs(&device), &targets);
        let (_, explicit) = LastLevelCELossConfig::new()
            .with_level_weights(Some(vec![1.0; 3]))
            .init::<TestBackend>(&labelmap, &device)
            .forward(leaf_outputs(&device), &targets);

        assert_eq!(implicit.into_scalar(), explicit.into_scalar());
    }

    #[test]
    fn each_level_uses_its_own_weight_slice() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let weights: Vec<f32> = (1..=15).map(|w| w as f32).collect();
        let loss = LastLevelCELossConfig::new()
            .with_weights(Some(weights.clone()))
            .init::<TestBackend>(&labelmap, &device);

        for (criterion, range) in loss.criteria.iter().zip(labelmap.level_ranges()) {
            let slice = criterion
                .weights
                .clone()
                .expect("Weighted criterion")
                .into_data()
                .to_vec::<f32>()
                .unwrap();
            assert_eq!(slice, weights[range.clone()].to_vec());
        }
    }

    #[test]
    fn gradients_stay_finite_for_unreachable_targets() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let loss = LastLevelCELossConfig::new().init::<TestAutodiffBackend>(&labelmap, &device);

        let mut logits = vec![0.0f32; 8];
        logits[0] = 10000.0;
        let outputs = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::new(logits, Shape::new([1, 8])),
            &device,
        )
        .require_grad();
        let targets = HierarchyTargets::from_leaves(&labelmap, &[7], &device).unwrap();

        let (_, value) = loss.forward(outputs.clone(), &targets);
        let grads = value.backward();
        let grad = outputs
            .grad(&grads)
            .expect("Outputs require grad")
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert!(grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    #[should_panic = "Outputs should hold the leaf level logits (8), got 15"]
    fn full_hierarchy_outputs_are_rejected() {
        let device = Default::default();
        let labelmap = small_labelmap();
        let loss = LastLevelCELossConfig::new().init::<TestBackend>(&labelmap, &device);

        let _distribution = loss.forward_distribution(Tensor::zeros([1, 15], &device));
    }

    #[test]
    #[should_panic = "Epsilon of last level cross entropy should be in interval (0, 1). Got 0"]
    fn zero_epsilon_is_rejected() {
        let device = Default::default();
        let _loss = LastLevelCELossConfig::new()
            .with_eps(0.0)
            .init::<TestBackend>(&small_labelmap(), &device);
    }
}
