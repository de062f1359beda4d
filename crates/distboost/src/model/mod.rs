//! High-level model API: configuration, the distributed regressor and the
//! trained booster.

mod booster;
mod config;
mod regressor;

pub use booster::Booster;
pub use config::{ConfigError, MAX_DEPTH, RegressorConfig, RegressorConfigBuilder, TreeMethod};
pub use regressor::DistributedRegressor;
