use std::ops::Range;

use burn::prelude::*;
use thiserror::Error;

/// Errors raised while building or querying a [LabelMap].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelMapError {
    #[error("Label map must define at least one level")]
    NoLevels,

    #[error("Level {level} has no classes")]
    EmptyLevel { level: usize },

    #[error("Got {names} level names for {levels} levels")]
    LevelNamesMismatch { levels: usize, names: usize },

    #[error("Expected {expected} children tables (one per non-leaf level), got {actual}")]
    ChildrenTablesMismatch { expected: usize, actual: usize },

    #[error("Level {level} ({name}) has {expected} classes but its children table has {actual} rows")]
    MissingParent {
        level: usize,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Parent {parent} at level {level} references child {child}, but level {} has {size} classes", .level + 1)]
    ChildOutOfRange {
        level: usize,
        parent: usize,
        child: usize,
        size: usize,
    },

    #[error("Index {index} is out of range for level {level} ({size} classes)")]
    IndexOutOfRange {
        level: usize,
        index: usize,
        size: usize,
    },

    #[error("Class {index} at level {level} has no parent")]
    NoParent { level: usize, index: usize },

    #[error("Label path has {actual} entries, expected one per level ({expected})")]
    PathLengthMismatch { expected: usize, actual: usize },
}

/// Serializable description of a taxonomy.
///
/// Levels are ordered from the root (coarsest) to the leaves (finest). For every
/// non-leaf level `i`, `children[i][p]` lists the local indices at level `i + 1`
/// whose parent is class `p` of level `i`.
#[derive(Config, Debug)]
pub struct LabelMapConfig {
    /// Number of classes at each level.
    pub levels: Vec<usize>,
    /// Human readable name of each level.
    pub level_names: Vec<String>,
    /// Parent to children tables, one per non-leaf level.
    pub children: Vec<Vec<Vec<usize>>>,
}

impl LabelMapConfig {
    /// Validate the taxonomy and build a [LabelMap].
    pub fn init(&self) -> Result<LabelMap, LabelMapError> {
        if self.levels.is_empty() {
            return Err(LabelMapError::NoLevels);
        }

        if let Some(level) = self.levels.iter().position(|&size| size == 0) {
            return Err(LabelMapError::EmptyLevel { level });
        }

        if self.level_names.len() != self.levels.len() {
            return Err(LabelMapError::LevelNamesMismatch {
                levels: self.levels.len(),
                names: self.level_names.len(),
            });
        }

        let expected_tables = self.levels.len() - 1;
        if self.children.len() != expected_tables {
            return Err(LabelMapError::ChildrenTablesMismatch {
                expected: expected_tables,
                actual: self.children.len(),
            });
        }

        let mut parents = Vec::with_capacity(expected_tables);

        for (level, table) in self.children.iter().enumerate() {
            if table.len() != self.levels[level] {
                return Err(LabelMapError::MissingParent {
                    level,
                    name: self.level_names[level].clone(),
                    expected: self.levels[level],
                    actual: table.len(),
                });
            }

            let child_size = self.levels[level + 1];
            let mut parent_of = vec![None; child_size];

            for (parent, children) in table.iter().enumerate() {
                for &child in children {
                    if child >= child_size {
                        return Err(LabelMapError::ChildOutOfRange {
                            level,
                            parent,
                            child,
                            size: child_size,
                        });
                    }
                    // First parent wins when a taxonomy lists a child twice.
                    parent_of[child].get_or_insert(parent);
                }
            }

            let orphans = parent_of.iter().filter(|p| p.is_none()).count();
            if orphans > 0 {
                tracing::warn!(
                    "{} classes at level {} ({}) have no parent in {}",
                    orphans,
                    level + 1,
                    self.level_names[level + 1],
                    self.level_names[level]
                );
            }

            parents.push(parent_of);
        }

        Ok(LabelMap {
            ranges: level_ranges(&self.levels),
            levels: self.levels.clone(),
            level_names: self.level_names.clone(),
            children: self.children.clone(),
            parents,
        })
    }
}

/// Flat index range of every level inside a `sum(levels)` wide vector.
///
/// Level `i` starts where level `i - 1` stops; level 0 starts at 0.
pub fn level_ranges(levels: &[usize]) -> Vec<Range<usize>> {
    let mut start = 0;
    levels
        .iter()
        .map(|&size| {
            let range = start..start + size;
            start = range.end;
            range
        })
        .collect()
}

/// A validated taxonomy. Built with [LabelMapConfig::init].
#[derive(Debug, Clone)]
pub struct LabelMap {
    levels: Vec<usize>,
    level_names: Vec<String>,
    children: Vec<Vec<Vec<usize>>>,
    parents: Vec<Vec<Option<usize>>>,
    ranges: Vec<Range<usize>>,
}

impl LabelMap {
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn n_classes(&self) -> usize {
        self.levels.iter().sum()
    }

    pub fn level_names(&self) -> &[String] {
        &self.level_names
    }

    pub fn level_ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn level_start(&self, level: usize) -> usize {
        self.ranges[level].start
    }

    pub fn level_stop(&self, level: usize) -> usize {
        self.ranges[level].end
    }

    /// Parent to children table of a non-leaf level.
    pub fn children(&self, level: usize) -> &[Vec<usize>] {
        &self.children[level]
    }

    /// Children (local indices at `level + 1`) of `parent` at `level`.
    pub fn child_of(&self, level: usize, parent: usize) -> Result<&[usize], LabelMapError> {
        let table = self
            .children
            .get(level)
            .ok_or(LabelMapError::IndexOutOfRange {
                level,
                index: parent,
                size: 0,
            })?;

        table
            .get(parent)
            .map(Vec::as_slice)
            .ok_or(LabelMapError::IndexOutOfRange {
                level,
                index: parent,
                size: table.len(),
            })
    }

    /// Parent at `level - 1` of `child` at `level`, if the taxonomy lists one.
    pub fn parent_of(&self, level: usize, child: usize) -> Option<usize> {
        if level == 0 {
            return None;
        }
        self.parents
            .get(level - 1)
            .and_then(|parents| parents.get(child).copied().flatten())
    }

    /// Convert a local index at `level` into its flat index.
    pub fn flat_index(&self, level: usize, local: usize) -> Result<usize, LabelMapError> {
        let size = self.levels.get(level).copied().unwrap_or(0);
        if local >= size {
            return Err(LabelMapError::IndexOutOfRange {
                level,
                index: local,
                size,
            });
        }
        Ok(self.ranges[level].start + local)
    }

    /// Walk from a leaf up to the root and return the local index at every level,
    /// ordered root first.
    pub fn path_to_leaf(&self, leaf: usize) -> Result<Vec<usize>, LabelMapError> {
        let leaf_level = self.num_levels() - 1;
        self.flat_index(leaf_level, leaf)?;

        let mut path = vec![leaf];
        let mut current = leaf;
        for level in (1..=leaf_level).rev() {
            current = self
                .parent_of(level, current)
                .ok_or(LabelMapError::NoParent {
                    level,
                    index: current,
                })?;
            path.push(current);
        }
        path.reverse();

        Ok(path)
    }

    /// Whether every step of `path` follows a parent to child edge.
    pub fn is_consistent(&self, path: &[usize]) -> bool {
        if path.len() != self.num_levels() {
            return false;
        }

        path.windows(2).enumerate().all(|(level, pair)| {
            self.child_of(level, pair[0])
                .map(|children| children.contains(&pair[1]))
                .unwrap_or(false)
        })
    }
}
