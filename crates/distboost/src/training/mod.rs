//! Training engine: objectives, metrics, early stopping and the distributed
//! histogram tree trainer.

mod callback;
mod eval;
mod gradients;
mod logger;
mod metrics;
mod objectives;
mod weights;

pub mod hist;

pub use callback::{EarlyStopAction, EarlyStopping};
pub use eval::{EvalsResult, MetricValue};
pub use gradients::{GradStats, GradsTuple};
pub use hist::{GainParams, HistParams, HistTrainer, TrainOutput, WeightedSet};
pub use logger::{TrainingLogger, Verbosity};
pub use metrics::{Mae, Metric, MetricFn, MetricPartial, Mphe, Rmse};
pub use objectives::{Objective, ObjectiveFn, PseudoHuberLoss, SquaredLoss};
pub use weights::{WeightsIter, WeightsView};
