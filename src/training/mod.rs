pub mod learner;
pub mod loss;
pub mod metrics;

pub use learner::HierarchyOutput;
pub use loss::{
    LastLevelCELoss, LastLevelCELossConfig, LevelCrossEntropy, LevelCrossEntropyConfig,
    MultiLabelSMLoss, MultiLabelSMLossConfig, MultiLevelCELoss, MultiLevelCELossConfig,
};
pub use metrics::{PathAccuracyInput, PathAccuracyMetric};
