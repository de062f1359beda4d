//! distboost: data-parallel gradient boosting over a local accelerator
//! cluster.
//!
//! # Key Types
//!
//! - [`LocalCluster`] / [`Client`] - In-process workers bound to devices, and
//!   the handle that submits work to them
//! - [`DArray`] - Lazy, row-partitioned arrays whose blocks live on workers
//! - [`DistributedRegressor`] - Estimator-style fit/predict over a client
//! - [`Booster`] - The trained model
//!
//! # Training
//!
//! Configure with [`RegressorConfig::builder()`] or string-keyed
//! [`DistributedRegressor::set_params`], bind a client, then call
//! [`DistributedRegressor::fit`]. See [`demo::run`] for a complete run.

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod array;
pub mod cluster;
pub mod demo;
pub mod error;
pub mod model;
pub mod repr;
pub mod testing;
pub mod training;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use error::{Error, Result};

// Cluster and arrays
pub use array::{DArray, DArray1, DArray2};
pub use cluster::{Client, ClusterConfig, Device, LocalCluster};

// High-level model types
pub use model::{Booster, DistributedRegressor, RegressorConfig, TreeMethod};

// Training types (objectives, metrics)
pub use training::{EvalsResult, Metric, MetricFn, Objective, ObjectiveFn, Verbosity};
