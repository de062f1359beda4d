//! Crate-wide error type.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised by
//! the cluster, the array layer or the training engine propagate unchanged to
//! the caller; nothing in the crate retries or wraps them with extra context.

use crate::cluster::{Device, WorkerId};
use crate::model::ConfigError;
use crate::repr::ForestValidationError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the cluster, array and training layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Cluster / client ---
    /// The cluster has been shut down.
    #[error("cluster is closed")]
    ClusterClosed,

    /// The client has been closed.
    #[error("client is closed")]
    ClientClosed,

    /// A cluster must have at least one worker.
    #[error("cluster needs at least one worker")]
    NoWorkers,

    /// A worker's thread pool could not be started.
    #[error("failed to start worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A task referenced a worker that does not exist.
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    /// A task panicked on a worker.
    #[error("worker {0} panicked while running a task")]
    WorkerPanicked(WorkerId),

    /// A worker is not bound to the device the regressor targets.
    #[error("device {requested} requested but worker {worker} is bound to {available}")]
    DeviceUnavailable {
        requested: Device,
        worker: WorkerId,
        available: Device,
    },

    // --- Arrays ---
    /// Chunk sizes must be positive.
    #[error("chunk size must be positive, got {0}")]
    InvalidChunkSize(usize),

    /// Two arrays that must share row partitioning do not.
    #[error("arrays `{left}` and `{right}` are not aligned: {reason}")]
    Misaligned {
        left: String,
        right: String,
        reason: String,
    },

    /// An ndarray shape operation failed.
    #[error("invalid array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    // --- Training / model ---
    /// Invalid regressor or cluster configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `fit` was called without a client bound to the regressor.
    #[error("no client is bound to the regressor")]
    NoClient,

    /// Training data has no rows or no features.
    #[error("training data is empty")]
    EmptyDataset,

    /// The model has not been fitted yet.
    #[error("model is not fitted; call `fit` first")]
    NotFitted,

    /// Prediction input does not match the trained feature count.
    #[error("feature count mismatch: model expects {expected}, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    // --- Persistence ---
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A loaded model failed structural validation.
    #[error("invalid model: {0}")]
    InvalidModel(#[from] ForestValidationError),
}
