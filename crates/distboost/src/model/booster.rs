//! Trained model returned by a regressor.

use std::path::Path;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::repr::Forest;
use crate::training::Objective;

/// A trained forest together with the metadata needed to use it.
///
/// Prediction runs locally on the calling thread's rayon pool; use
/// [`DistributedRegressor::predict`](super::DistributedRegressor::predict) for
/// partitioned inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    forest: Forest,
    n_features: usize,
    objective: Objective,
    best_iteration: Option<usize>,
    best_score: Option<f64>,
}

impl Booster {
    pub(crate) fn new(
        forest: Forest,
        n_features: usize,
        objective: Objective,
        best_iteration: Option<usize>,
        best_score: Option<f64>,
    ) -> Self {
        Self {
            forest,
            n_features,
            objective,
            best_iteration,
            best_score,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Number of trees in the model.
    pub fn num_boosted_rounds(&self) -> usize {
        self.forest.n_trees()
    }

    pub fn num_features(&self) -> usize {
        self.n_features
    }

    /// Best round under early stopping, `None` if it was off.
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Predict a `rows x features` matrix.
    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        if features.ncols() != self.n_features {
            return Err(Error::FeatureMismatch {
                expected: self.n_features,
                got: features.ncols(),
            });
        }
        Ok(self.forest.predict(features))
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a model.
    pub fn from_json(json: &str) -> Result<Self> {
        let booster: Booster = serde_json::from_str(json)?;
        booster.forest.validate(booster.n_features)?;
        Ok(booster)
    }

    /// Save the model to a JSON file.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_model(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::TreeBuilder;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn booster() -> Booster {
        let mut b = TreeBuilder::new();
        let (l, r) = b.split(0, 1, 0.5, true, 1.0, 2.0);
        b.make_leaf(l, -1.0, 1.0);
        b.make_leaf(r, 1.0, 1.0);
        let mut forest = Forest::new(0.5);
        forest.push_tree(b.build());
        Booster::new(forest, 2, Objective::SquaredError, Some(0), Some(0.25))
    }

    #[test]
    fn predicts_with_feature_check() {
        let booster = booster();
        let preds = booster.predict(array![[0.0f32, 0.0], [0.0, 1.0]].view()).unwrap();
        assert_abs_diff_eq!(preds[0], -0.5);
        assert_abs_diff_eq!(preds[1], 1.5);

        let err = booster.predict(array![[0.0f32]].view()).unwrap_err();
        assert!(matches!(err, Error::FeatureMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn json_round_trip() {
        let booster = booster();
        let back = Booster::from_json(&booster.to_json().unwrap()).unwrap();
        assert_eq!(back, booster);
        assert_eq!(back.num_boosted_rounds(), 1);
        assert_eq!(back.best_iteration(), Some(0));
    }

    #[test]
    fn load_rejects_out_of_range_features() {
        let mut booster = booster();
        booster.n_features = 1;
        let json = serde_json::to_string(&booster).unwrap();
        assert!(matches!(Booster::from_json(&json), Err(Error::InvalidModel(_))));
    }
}
