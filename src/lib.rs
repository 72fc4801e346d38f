pub mod taxonomy;

#[cfg(feature = "training")]
pub mod training;

#[cfg(feature = "convert")]
pub mod convert;

pub use taxonomy::{HierarchyTargets, LabelMap, LabelMapConfig, LabelMapError};

#[cfg(feature = "training")]
pub use training::{
    HierarchyOutput, LastLevelCELoss, LastLevelCELossConfig, MultiLabelSMLoss,
    MultiLabelSMLossConfig, MultiLevelCELoss, MultiLevelCELossConfig, PathAccuracyMetric,
};

#[cfg(feature = "convert")]
pub use convert::{ConvertError, NpyArray};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
