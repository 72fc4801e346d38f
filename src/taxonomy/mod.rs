mod labelmap;
mod targets;

pub use labelmap::{LabelMap, LabelMapConfig, LabelMapError, level_ranges};
pub use targets::HierarchyTargets;

#[cfg(test)]
pub(crate) use labelmap::tests::{proportional_labelmap, small_labelmap};
