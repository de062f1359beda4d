//! Histogram-based distributed tree training.
//!
//! Features are quantized once per fit into at most [`MAX_BINS`] bins per
//! feature. Workers accumulate gradient histograms over the bins of the rows
//! they own and the driver reduces them to pick splits.

mod binned;
mod histogram;
mod quantile;
mod shard;
mod split;
mod trainer;

pub use binned::{BinnedBlock, MAX_BINS};
pub use histogram::{HistogramBin, NodeHistogram};
pub use quantile::{FeatureSummary, HistogramCuts, QuantileSketch};
pub use shard::{EvalShard, NodeSplit, RowBlock, WorkerShard};
pub use split::{GainParams, SplitCandidate, find_best_split};
pub use trainer::{HistParams, HistTrainer, TrainOutput, WeightedSet};
