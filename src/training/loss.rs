mod last_level;
mod level;
mod multi_label;
mod multi_level;

pub use last_level::{LastLevelCELoss, LastLevelCELossConfig};
pub use level::{LevelCrossEntropy, LevelCrossEntropyConfig, level_criteria};
pub use multi_label::{MultiLabelSMLoss, MultiLabelSMLossConfig};
pub use multi_level::{MultiLevelCELoss, MultiLevelCELossConfig};
