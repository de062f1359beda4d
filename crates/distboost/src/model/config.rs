//! Regressor configuration with builder pattern.
//!
//! [`RegressorConfig`] holds every hyperparameter of a
//! [`DistributedRegressor`](super::DistributedRegressor). It can be built with
//! the `bon` builder, which validates on `build()`, or adjusted afterwards
//! through string-keyed [`RegressorConfig::set_param`].
//!
//! # Example
//!
//! ```
//! use distboost::cluster::Device;
//! use distboost::model::{RegressorConfig, TreeMethod};
//! use distboost::training::Verbosity;
//!
//! let mut config = RegressorConfig::builder()
//!     .verbosity(Verbosity::Info)
//!     .n_estimators(50)
//!     .build()
//!     .unwrap();
//! config.set_params([("tree_method", "hist"), ("device", "cuda")]).unwrap();
//! assert_eq!(config.tree_method, TreeMethod::Hist);
//! assert_eq!(config.device, Device::cuda());
//! ```

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::cluster::Device;
use crate::training::hist::MAX_BINS;
use crate::training::{GainParams, HistParams, Metric, Objective, ObjectiveFn, Verbosity};

/// Deepest tree the trainer grows.
pub const MAX_DEPTH: usize = 16;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Learning rate must be positive.
    #[error("learning_rate must be positive, got {0}")]
    InvalidLearningRate(f32),
    /// Number of boosting rounds must be at least 1.
    #[error("n_estimators must be at least 1")]
    InvalidNEstimators,
    #[error("max_depth must be in 1..=16, got {0}")]
    InvalidMaxDepth(usize),
    #[error("max_bin must be in 2..=256, got {0}")]
    InvalidMaxBin(usize),
    /// Invalid regularization parameter.
    #[error("{field} must be non-negative, got {value}")]
    InvalidRegularization { field: &'static str, value: f32 },
    #[error("early_stopping_rounds must be at least 1")]
    InvalidEarlyStoppingRounds,
    #[error("huber_slope must be positive, got {0}")]
    InvalidHuberSlope(f32),
    /// `set_param` was given a key the regressor does not know.
    #[error("unknown parameter `{0}`")]
    UnknownParam(String),
    /// A value could not be parsed for its key.
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    /// The tree method exists but is not implemented.
    #[error("tree_method `{0}` is not supported; use `hist`")]
    UnsupportedTreeMethod(String),
    #[error("a cluster needs at least one worker")]
    InvalidWorkerCount,
    #[error("threads_per_worker must be at least 1")]
    InvalidThreadCount,
    #[error("{n_ordinals} device ordinals given for {n_workers} workers")]
    OrdinalCountMismatch { n_ordinals: usize, n_workers: usize },
}

fn invalid_value(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid_value(key, value))
}

// =============================================================================
// TreeMethod
// =============================================================================

/// Tree construction algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeMethod {
    /// Let the library choose; resolves to [`TreeMethod::Hist`].
    Auto,
    /// Quantized histogram method.
    #[default]
    Hist,
}

impl TreeMethod {
    /// The method training actually uses.
    pub fn resolve(self) -> TreeMethod {
        TreeMethod::Hist
    }
}

impl fmt::Display for TreeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeMethod::Auto => f.write_str("auto"),
            TreeMethod::Hist => f.write_str("hist"),
        }
    }
}

impl FromStr for TreeMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TreeMethod::Auto),
            "hist" | "gpu_hist" => Ok(TreeMethod::Hist),
            other @ ("approx" | "exact") => Err(ConfigError::UnsupportedTreeMethod(other.to_string())),
            _ => Err(invalid_value("tree_method", s)),
        }
    }
}

// =============================================================================
// RegressorConfig
// =============================================================================

/// Hyperparameters of a distributed regressor.
///
/// # Structure
///
/// - **Objective & Metric**: what to optimize and how to measure progress
/// - **Boosting**: `n_estimators` and `learning_rate`
/// - **Tree**: `max_depth` and `max_bin`
/// - **Regularization**: `reg_lambda`, `reg_alpha`, `gamma`, `min_child_weight`
/// - **Placement**: `tree_method` and `device`
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct RegressorConfig {
    // === Objective & Metric ===
    /// Loss function for training. Default: squared error.
    #[builder(default)]
    pub objective: Objective,

    /// Evaluation metric. `None` uses the objective's default metric.
    pub eval_metric: Option<Metric>,

    // === Boosting parameters ===
    /// Number of boosting rounds. Default: 100.
    #[builder(default = 100)]
    pub n_estimators: usize,

    /// Learning rate (shrinkage). Default: 0.3.
    #[builder(default = 0.3)]
    pub learning_rate: f32,

    // === Tree structure ===
    /// Maximum tree depth. Default: 6.
    #[builder(default = 6)]
    pub max_depth: usize,

    /// Maximum histogram bins per feature. Default: 256.
    #[builder(default = 256)]
    pub max_bin: usize,

    // === Regularization ===
    /// L2 regularization on leaf weights. Default: 1.0.
    #[builder(default = 1.0)]
    pub reg_lambda: f32,

    /// L1 regularization on leaf weights. Default: 0.0.
    #[builder(default = 0.0)]
    pub reg_alpha: f32,

    /// Minimum loss reduction to make a split. Default: 0.0.
    #[builder(default = 0.0)]
    pub gamma: f32,

    /// Minimum hessian sum in each child. Default: 1.0.
    #[builder(default = 1.0)]
    pub min_child_weight: f32,

    // === Placement ===
    #[builder(default)]
    pub tree_method: TreeMethod,

    /// Device the workers holding training data must be bound to.
    #[builder(default)]
    pub device: Device,

    // === Early stopping ===
    /// Stop if the last eval set does not improve for this many rounds.
    pub early_stopping_rounds: Option<usize>,

    // === Logging ===
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl<S: regressor_config_builder::IsComplete> RegressorConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is out of range.
    pub fn build(self) -> Result<RegressorConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl RegressorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::InvalidNEstimators);
        }
        if !(1..=MAX_DEPTH).contains(&self.max_depth) {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        if !(2..=MAX_BINS).contains(&self.max_bin) {
            return Err(ConfigError::InvalidMaxBin(self.max_bin));
        }
        for (field, value) in [
            ("reg_lambda", self.reg_lambda),
            ("reg_alpha", self.reg_alpha),
            ("gamma", self.gamma),
            ("min_child_weight", self.min_child_weight),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidRegularization { field, value });
            }
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(ConfigError::InvalidEarlyStoppingRounds);
        }
        if let Objective::PseudoHuberError { slope } = self.objective
            && !(slope > 0.0)
        {
            return Err(ConfigError::InvalidHuberSlope(slope));
        }
        Ok(())
    }

    /// Set one parameter by name.
    ///
    /// The configuration is left unchanged if the key is unknown, the value
    /// does not parse, or the result fails validation.
    pub fn set_param(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        match key {
            "objective" => next.objective = value.parse()?,
            "eval_metric" => next.eval_metric = Some(value.parse()?),
            "huber_slope" => match next.objective {
                Objective::PseudoHuberError { .. } => {
                    next.objective = Objective::PseudoHuberError {
                        slope: parse_value(key, value)?,
                    }
                }
                Objective::SquaredError => {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            },
            "n_estimators" => next.n_estimators = parse_value(key, value)?,
            "learning_rate" | "eta" => next.learning_rate = parse_value(key, value)?,
            "max_depth" => next.max_depth = parse_value(key, value)?,
            "max_bin" => next.max_bin = parse_value(key, value)?,
            "reg_lambda" | "lambda" => next.reg_lambda = parse_value(key, value)?,
            "reg_alpha" | "alpha" => next.reg_alpha = parse_value(key, value)?,
            "gamma" | "min_split_loss" => next.gamma = parse_value(key, value)?,
            "min_child_weight" => next.min_child_weight = parse_value(key, value)?,
            "tree_method" => next.tree_method = value.parse()?,
            "device" => next.device = value.parse()?,
            "early_stopping_rounds" => next.early_stopping_rounds = Some(parse_value(key, value)?),
            "verbosity" => next.verbosity = value.parse()?,
            _ => return Err(ConfigError::UnknownParam(key.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Set several parameters in order, stopping at the first error.
    pub fn set_params<'a>(
        &mut self,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in params {
            self.set_param(key, value)?;
        }
        Ok(())
    }

    /// Metric used for eval sets.
    ///
    /// A pseudo-Huber metric takes its slope from a pseudo-Huber objective.
    pub fn resolved_metric(&self) -> Metric {
        match (self.eval_metric, self.objective) {
            (Some(Metric::Mphe { .. }), Objective::PseudoHuberError { slope }) => {
                Metric::Mphe { slope }
            }
            (Some(metric), _) => metric,
            (None, objective) => objective.default_metric(),
        }
    }

    /// Trainer parameters for this configuration.
    pub fn hist_params(&self) -> HistParams {
        HistParams {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            max_bin: self.max_bin,
            gain: GainParams {
                reg_lambda: self.reg_lambda,
                reg_alpha: self.reg_alpha,
                min_gain: self.gamma,
                min_child_weight: self.min_child_weight,
            },
            early_stopping_rounds: self.early_stopping_rounds.unwrap_or(0),
            device: self.device,
            verbosity: self.verbosity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_config() {
        let config = RegressorConfig::builder().build().unwrap();
        assert_eq!(config, RegressorConfig::default());
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.learning_rate, 0.3);
        assert_eq!(config.max_depth, 6);
        assert_eq!(config.tree_method, TreeMethod::Hist);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.verbosity, Verbosity::Warning);
        assert_eq!(config.resolved_metric(), Metric::Rmse);
    }

    #[test]
    fn builder_validates() {
        let result = RegressorConfig::builder().learning_rate(0.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLearningRate(_))));

        let result = RegressorConfig::builder().n_estimators(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidNEstimators)));

        let result = RegressorConfig::builder().reg_lambda(-1.0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRegularization { field: "reg_lambda", .. })
        ));

        let result = RegressorConfig::builder().max_bin(512).build();
        assert!(matches!(result, Err(ConfigError::InvalidMaxBin(512))));
    }

    #[rstest]
    #[case("hist", TreeMethod::Hist)]
    #[case("HIST", TreeMethod::Hist)]
    #[case("gpu_hist", TreeMethod::Hist)]
    #[case("auto", TreeMethod::Auto)]
    fn parses_tree_method(#[case] input: &str, #[case] expected: TreeMethod) {
        assert_eq!(input.parse::<TreeMethod>().unwrap(), expected);
    }

    #[rstest]
    #[case("approx")]
    #[case("exact")]
    fn rejects_unsupported_tree_methods(#[case] input: &str) {
        assert_eq!(
            input.parse::<TreeMethod>(),
            Err(ConfigError::UnsupportedTreeMethod(input.to_string()))
        );
    }

    #[test]
    fn set_params_applies_in_order() {
        let mut config = RegressorConfig::default();
        config
            .set_params([
                ("tree_method", "hist"),
                ("device", "cuda"),
                ("n_estimators", "10"),
                ("eta", "0.1"),
                ("verbosity", "2"),
                ("objective", "reg:pseudohubererror"),
            ])
            .unwrap();
        assert_eq!(config.device, Device::cuda());
        assert_eq!(config.n_estimators, 10);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.verbosity, Verbosity::Info);
        assert_eq!(config.resolved_metric(), Metric::mphe());
    }

    #[test]
    fn huber_slope_reaches_objective_and_metric() {
        let mut config = RegressorConfig::default();
        assert!(config.set_param("huber_slope", "10").is_err());

        config
            .set_params([
                ("objective", "reg:pseudohubererror"),
                ("huber_slope", "10"),
            ])
            .unwrap();
        assert_eq!(config.objective, Objective::PseudoHuberError { slope: 10.0 });
        assert_eq!(config.resolved_metric(), Metric::Mphe { slope: 10.0 });

        config.set_param("eval_metric", "mphe").unwrap();
        assert_eq!(config.resolved_metric(), Metric::Mphe { slope: 10.0 });

        assert!(matches!(
            config.set_param("huber_slope", "0"),
            Err(ConfigError::InvalidHuberSlope(_))
        ));
        assert_eq!(config.objective, Objective::PseudoHuberError { slope: 10.0 });
    }

    #[test]
    fn set_param_leaves_config_unchanged_on_error() {
        let mut config = RegressorConfig::default();
        let before = config.clone();

        assert_eq!(
            config.set_param("colour", "blue"),
            Err(ConfigError::UnknownParam("colour".into()))
        );
        assert!(matches!(
            config.set_param("max_depth", "deep"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set_param("max_depth", "0"),
            Err(ConfigError::InvalidMaxDepth(0))
        ));
        assert_eq!(config, before);
    }

    #[test]
    fn hist_params_mapping() {
        let config = RegressorConfig::builder()
            .gamma(0.5)
            .early_stopping_rounds(3)
            .build()
            .unwrap();
        let params = config.hist_params();
        assert_eq!(params.gain.min_gain, 0.5);
        assert_eq!(params.early_stopping_rounds, 3);
        assert_eq!(params.max_bin, 256);
    }

    #[test]
    fn serde_round_trip() {
        let config = RegressorConfig::builder()
            .device(Device::cuda())
            .eval_metric(Metric::Mae)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: RegressorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
