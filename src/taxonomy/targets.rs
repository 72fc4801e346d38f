use burn::prelude::*;
use derive_new::new;

use super::{LabelMap, LabelMapError};

/// Ground truth for one batch.
///
/// # Shapes
///
/// - labels: `[batch_size, n_classes]` multi-hot indicator over every level
/// - level_labels: `[batch_size, num_levels]` local class index at each level
#[derive(new, Clone, Debug)]
pub struct HierarchyTargets<B: Backend> {
    pub labels: Tensor<B, 2>,
    pub level_labels: Tensor<B, 2, Int>,
}

impl<B: Backend> HierarchyTargets<B> {
    /// Build the targets of a batch from label paths.
    ///
    /// Every path holds one local index per level, root first.
    pub fn from_paths(
        labelmap: &LabelMap,
        paths: &[Vec<usize>],
        device: &B::Device,
    ) -> Result<Self, LabelMapError> {
        let batch_size = paths.len();
        let num_levels = labelmap.num_levels();
        let n_classes = labelmap.n_classes();

        let mut labels = vec![0.0f32; batch_size * n_classes];
        let mut level_labels = Vec::with_capacity(batch_size * num_levels);

        for (row, path) in paths.iter().enumerate() {
            if path.len() != num_levels {
                return Err(LabelMapError::PathLengthMismatch {
                    expected: num_levels,
                    actual: path.len(),
                });
            }

            for (level, &local) in path.iter().enumerate() {
                let flat = labelmap.flat_index(level, local)?;
                labels[row * n_classes + flat] = 1.0;
                level_labels.push(local as i64);
            }
        }

        let labels = Tensor::<B, 2>::from_data(
            TensorData::new(labels, Shape::new([batch_size, n_classes]))
                .convert::<B::FloatElem>(),
            device,
        );
        let level_labels = Tensor::<B, 2, Int>::from_data(
            TensorData::new(level_labels, Shape::new([batch_size, num_levels]))
                .convert::<B::IntElem>(),
            device,
        );

        Ok(Self {
            labels,
            level_labels,
        })
    }

    /// Build the targets of a batch from leaf indices, deriving the ancestors.
    pub fn from_leaves(
        labelmap: &LabelMap,
        leaves: &[usize],
        device: &B::Device,
    ) -> Result<Self, LabelMapError> {
        let paths = leaves
            .iter()
            .map(|&leaf| labelmap.path_to_leaf(leaf))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_paths(labelmap, &paths, device)
    }

    pub fn batch_size(&self) -> usize {
        self.level_labels.dims()[0]
    }

    /// Ground truth local indices of a single level, shape `[batch_size]`.
    pub fn level(&self, level: usize) -> Tensor<B, 1, Int> {
        let [batch_size, _] = self.level_labels.dims();
        self.level_labels
            .clone()
            .narrow(1, level, 1)
            .reshape([batch_size])
    }
}
