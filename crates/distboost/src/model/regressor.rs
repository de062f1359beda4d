//! Estimator-style front end over the distributed trainer.

use std::sync::Arc;

use ndarray::{Array2, Ix1};

use super::{Booster, ConfigError, RegressorConfig};
use crate::array::{DArray1, DArray2};
use crate::cluster::Client;
use crate::error::{Error, Result};
use crate::training::{EvalsResult, HistTrainer, WeightedSet};

/// State produced by a successful fit.
#[derive(Debug, Clone)]
struct Fitted {
    booster: Arc<Booster>,
    evals_result: EvalsResult,
}

/// Gradient-boosted regressor trained on partitioned data through a
/// [`Client`].
///
/// # Example
///
/// ```
/// use distboost::array::{random_1d, random_2d};
/// use distboost::cluster::{Client, LocalCluster};
/// use distboost::model::{DistributedRegressor, RegressorConfig};
///
/// let cluster = LocalCluster::cpu(2).unwrap();
/// let client = Client::connect(&cluster).unwrap();
///
/// let x = random_2d((200, 4), 50).unwrap();
/// let y = random_1d(200, 50).unwrap();
///
/// let config = RegressorConfig::builder().n_estimators(5).build().unwrap();
/// let mut model = DistributedRegressor::new(config);
/// model.set_client(client.clone());
/// model.fit(&x, &y, &[(&x, &y)]).unwrap();
///
/// let preds = model.predict(&x).unwrap();
/// assert_eq!(preds.chunks(), x.chunks());
/// assert_eq!(model.evals_result().unwrap().n_iterations(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct DistributedRegressor {
    config: RegressorConfig,
    client: Option<Client>,
    fitted: Option<Fitted>,
}

impl DistributedRegressor {
    pub fn new(config: RegressorConfig) -> Self {
        Self {
            config,
            client: None,
            fitted: None,
        }
    }

    pub fn config(&self) -> &RegressorConfig {
        &self.config
    }

    /// Set one hyperparameter by name, e.g. `("device", "cuda")`.
    pub fn set_param(&mut self, key: &str, value: &str) -> std::result::Result<&mut Self, ConfigError> {
        self.config.set_param(key, value)?;
        Ok(self)
    }

    pub fn set_params<'a>(
        &mut self,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> std::result::Result<&mut Self, ConfigError> {
        self.config.set_params(params)?;
        Ok(self)
    }

    /// Bind the regressor to a cluster client.
    pub fn set_client(&mut self, client: Client) -> &mut Self {
        self.client = Some(client);
        self
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Fit on `x`/`y`, recording metrics on every pair of `eval_set`.
    ///
    /// Refitting replaces the previous model.
    pub fn fit(
        &mut self,
        x: &DArray2,
        y: &DArray1,
        eval_set: &[(&DArray2, &DArray1)],
    ) -> Result<&mut Self> {
        let eval_set: Vec<WeightedSet<'_>> =
            eval_set.iter().copied().map(WeightedSet::from).collect();
        self.fit_weighted(WeightedSet::new(x, y), &eval_set)
    }

    /// Fit with optional per-row sample weights on the training set and on
    /// each eval set.
    ///
    /// # Example
    ///
    /// ```
    /// use distboost::array::{random_1d, random_2d};
    /// use distboost::cluster::{Client, LocalCluster};
    /// use distboost::model::{DistributedRegressor, RegressorConfig};
    /// use distboost::training::WeightedSet;
    ///
    /// let cluster = LocalCluster::cpu(1).unwrap();
    /// let client = Client::connect(&cluster).unwrap();
    /// let x = random_2d((100, 3), 25).unwrap();
    /// let y = random_1d(100, 25).unwrap();
    /// let w = random_1d(100, 25).unwrap();
    ///
    /// let config = RegressorConfig::builder().n_estimators(3).build().unwrap();
    /// let mut model = DistributedRegressor::new(config);
    /// model.set_client(client);
    /// let train = WeightedSet::new(&x, &y).with_weight(&w);
    /// model.fit_weighted(train, &[train]).unwrap();
    /// assert_eq!(model.evals_result().unwrap().n_iterations(), 3);
    /// ```
    pub fn fit_weighted(
        &mut self,
        train: WeightedSet<'_>,
        eval_set: &[WeightedSet<'_>],
    ) -> Result<&mut Self> {
        let client = self.client.clone().ok_or(Error::NoClient)?;
        self.config.validate()?;

        let tree_method = self.config.tree_method.resolve();
        let metric = self.config.resolved_metric();
        tracing::info!(
            %tree_method,
            device = %self.config.device,
            objective = %self.config.objective,
            %metric,
            n_rows = train.x.n_rows(),
            n_blocks = train.x.n_blocks(),
            weighted = train.weight.is_some(),
            "fitting regressor"
        );

        let trainer = HistTrainer::new(
            client,
            self.config.objective,
            metric,
            self.config.hist_params(),
        );
        let output = trainer.train_weighted(train, eval_set)?;

        let booster = Booster::new(
            output.forest,
            output.n_features,
            self.config.objective,
            output.best_iteration,
            output.best_score,
        );
        self.fitted = Some(Fitted {
            booster: Arc::new(booster),
            evals_result: output.evals_result,
        });
        Ok(self)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(Error::NotFitted)
    }

    // =========================================================================
    // Inference
    // =========================================================================

    /// Lazily predict every block of `x`.
    ///
    /// The result has `x`'s row chunks and keeps each block's worker
    /// affinity. Nothing is computed until the result is persisted or
    /// gathered.
    pub fn predict(&self, x: &DArray2) -> Result<DArray1> {
        let booster = Arc::clone(&self.fitted()?.booster);
        let got = x.shape()[1];
        if got != booster.num_features() {
            return Err(Error::FeatureMismatch {
                expected: booster.num_features(),
                got,
            });
        }

        x.map_blocks("predict", Ix1(x.n_rows()), move |block: &Array2<f32>| {
            booster.predict(block.view())
        })
    }

    /// The trained model.
    pub fn get_booster(&self) -> Result<Booster> {
        Ok(Booster::clone(&self.fitted()?.booster))
    }

    /// Per-iteration metric history of the last fit.
    pub fn evals_result(&self) -> Result<&EvalsResult> {
        Ok(&self.fitted()?.evals_result)
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.fitted
            .as_ref()
            .and_then(|fitted| fitted.booster.best_iteration())
    }
}
