//! Additive ensemble of regression trees.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::tree::{Tree, TreeValidationError};

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestValidationError {
    #[error("tree {tree_idx} is invalid: {error}")]
    InvalidTree {
        tree_idx: usize,
        error: TreeValidationError,
    },
    #[error("tree {tree_idx} splits on feature {feature} but the forest has {n_features} features")]
    FeatureOutOfRange {
        tree_idx: usize,
        feature: u32,
        n_features: usize,
    },
}

/// Sum of tree outputs plus a constant base score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<Tree>,
    base_score: f32,
}

impl Forest {
    pub fn new(base_score: f32) -> Self {
        Self {
            trees: Vec::new(),
            base_score,
        }
    }

    pub fn push_tree(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn base_score(&self) -> f32 {
        self.base_score
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    /// Keep only the first `n_trees` trees.
    pub fn truncate(&mut self, n_trees: usize) {
        self.trees.truncate(n_trees);
    }

    /// Prediction for one row.
    #[inline]
    pub fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f32>()
    }

    /// Predictions for a `rows x features` matrix, in parallel over rows.
    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Array1<f32> {
        let mut out = Array1::zeros(features.nrows());
        Zip::from(&mut out)
            .and(features.axis_iter(Axis(0)))
            .par_for_each(|out, row| *out = self.predict_row(row));
        out
    }

    /// Validate every tree and check split features against `n_features`.
    pub fn validate(&self, n_features: usize) -> Result<(), ForestValidationError> {
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|error| ForestValidationError::InvalidTree { tree_idx, error })?;
            for node in 0..tree.n_nodes() as u32 {
                if !tree.is_leaf(node) && tree.split_index(node) as usize >= n_features {
                    return Err(ForestValidationError::FeatureOutOfRange {
                        tree_idx,
                        feature: tree.split_index(node),
                        n_features,
                    });
                }
            }
        }
        Ok(())
    }
}
