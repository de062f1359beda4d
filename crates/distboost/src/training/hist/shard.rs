//! Per-worker training state.
//!
//! A [`WorkerShard`] holds the row blocks a worker owns together with the
//! per-row state of the current boosting round (bins, gradients, node
//! positions and running predictions). Every method runs on the worker's
//! thread pool and parallelizes over blocks.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::{BinnedBlock, HistogramCuts, NodeHistogram, QuantileSketch};
use crate::cluster::{OnWorker, WorkerId};
use crate::repr::{NodeId, Tree};
use crate::training::{GradStats, GradsTuple, MetricFn, MetricPartial, ObjectiveFn, WeightsView};

/// One persisted row block: features, targets and optional sample weights.
#[derive(Debug, Clone)]
pub struct RowBlock {
    pub features: Arc<Array2<f32>>,
    pub targets: Arc<Array1<f32>>,
    pub weights: Option<Arc<Array1<f32>>>,
}

impl RowBlock {
    pub fn new(features: Arc<Array2<f32>>, targets: Arc<Array1<f32>>) -> Self {
        debug_assert_eq!(features.nrows(), targets.len());
        Self {
            features,
            targets,
            weights: None,
        }
    }

    pub fn with_weights(mut self, weights: Arc<Array1<f32>>) -> Self {
        debug_assert_eq!(self.targets.len(), weights.len());
        self.weights = Some(weights);
        self
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    #[inline]
    pub fn weights(&self) -> WeightsView<'_> {
        WeightsView::from_optional(self.weights.as_deref().map(|w| w.view()))
    }
}

/// A split to apply to the rows sitting in `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSplit {
    pub node: NodeId,
    pub feature: usize,
    /// Rows with a local bin `<= bin` go to `left`.
    pub bin: u8,
    pub left: NodeId,
    pub right: NodeId,
}

/// Maps node ids to dense slots.
fn slot_table<T: Copy>(entries: impl Iterator<Item = (NodeId, T)>) -> Vec<Option<T>> {
    let mut table = Vec::new();
    for (node, value) in entries {
        let idx = node as usize;
        if table.len() <= idx {
            table.resize(idx + 1, None);
        }
        table[idx] = Some(value);
    }
    table
}

#[inline]
fn lookup<T: Copy>(table: &[Option<T>], node: NodeId) -> Option<T> {
    table.get(node as usize).copied().flatten()
}

// =============================================================================
// WorkerShard
// =============================================================================

struct ShardBlock {
    data: RowBlock,
    bins: Option<BinnedBlock>,
    positions: Vec<NodeId>,
    predictions: Vec<f32>,
    grad_hess: Vec<GradsTuple>,
}

impl ShardBlock {
    fn new(data: RowBlock) -> Self {
        let n_rows = data.n_rows();
        Self {
            data,
            bins: None,
            positions: vec![0; n_rows],
            predictions: vec![0.0; n_rows],
            grad_hess: vec![GradsTuple::default(); n_rows],
        }
    }
}

/// Training rows owned by one worker.
pub struct WorkerShard {
    worker: WorkerId,
    blocks: Vec<ShardBlock>,
}

impl OnWorker for WorkerShard {
    fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl WorkerShard {
    pub fn new(worker: WorkerId, blocks: Vec<RowBlock>) -> Self {
        Self {
            worker,
            blocks: blocks.into_iter().map(ShardBlock::new).collect(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.positions.len()).sum()
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Quantile sketch of this shard's features.
    pub fn sketch(&self, n_features: usize, max_bin: usize) -> QuantileSketch {
        let mut sketch = QuantileSketch::new(n_features, max_bin);
        for block in &self.blocks {
            sketch.push_block(block.data.features.view(), block.data.weights());
        }
        sketch
    }

    /// Quantize every block with the global cuts.
    pub fn bin(&mut self, cuts: &HistogramCuts) {
        self.blocks.par_iter_mut().for_each(|block| {
            block.bins = Some(BinnedBlock::from_features(block.data.features.view(), cuts));
        });
    }

    pub fn base_score_partial(&self, objective: &impl ObjectiveFn) -> MetricPartial {
        self.blocks
            .iter()
            .map(|b| objective.base_score_partial(b.data.targets.view(), b.data.weights()))
            .sum()
    }

    pub fn init_predictions(&mut self, base_score: f32) {
        self.blocks
            .par_iter_mut()
            .for_each(|b| b.predictions.fill(base_score));
    }

    /// Compute gradients for the new round and move every row back to the root.
    ///
    /// Returns the shard's gradient sums.
    pub fn start_round(&mut self, objective: &impl ObjectiveFn) -> GradStats {
        self.blocks
            .par_iter_mut()
            .map(|block| {
                objective.compute_gradients_into(
                    &block.predictions,
                    block.data.targets.view(),
                    block.data.weights(),
                    &mut block.grad_hess,
                );
                block.positions.fill(0);

                let mut stats = GradStats::default();
                for &gh in &block.grad_hess {
                    stats.add_pair(gh);
                }
                stats
            })
            .sum()
    }

    /// Histograms of the rows currently in each of `nodes`, in that order.
    pub fn build_histograms(&self, nodes: &[NodeId], cuts: &HistogramCuts) -> Vec<NodeHistogram> {
        let slots = slot_table(nodes.iter().enumerate().map(|(slot, &node)| (node, slot)));
        let total_bins = cuts.total_bins();
        let empty = || vec![NodeHistogram::zeros(total_bins); nodes.len()];

        self.blocks
            .par_iter()
            .fold(empty, |mut hists, block| {
                if let Some(bins) = &block.bins {
                    NodeHistogram::accumulate_block(
                        &mut hists,
                        block.positions.iter().map(|&node| lookup(&slots, node)),
                        bins.view(),
                        &block.grad_hess,
                        cuts.offsets(),
                    );
                }
                hists
            })
            .reduce(empty, |mut acc, part| {
                for (a, b) in acc.iter_mut().zip(&part) {
                    *a += b;
                }
                acc
            })
    }

    /// Move rows of split nodes into their children.
    pub fn apply_splits(&mut self, splits: &[NodeSplit]) {
        let table = slot_table(splits.iter().map(|s| (s.node, *s)));
        self.blocks.par_iter_mut().for_each(|block| {
            let Some(bins) = &block.bins else { return };
            for (row, position) in block.positions.iter_mut().enumerate() {
                if let Some(split) = lookup(&table, *position) {
                    *position = if bins.bin(row, split.feature) <= split.bin {
                        split.left
                    } else {
                        split.right
                    };
                }
            }
        });
    }

    /// Add the finished tree's leaf values to the running predictions.
    ///
    /// Uses the rows' final node positions, so no tree traversal is needed.
    pub fn update_predictions(&mut self, tree: &Tree) {
        self.blocks.par_iter_mut().for_each(|block| {
            for (pred, &node) in block.predictions.iter_mut().zip(&block.positions) {
                *pred += tree.leaf_value(node);
            }
        });
    }

    pub fn metric_partial(&self, metric: &impl MetricFn) -> MetricPartial {
        self.blocks
            .par_iter()
            .map(|b| metric.partial(&b.predictions, b.data.targets.view(), b.data.weights()))
            .sum()
    }

    /// Running predictions, concatenated in block order.
    pub fn predictions(&self) -> Vec<f32> {
        self.blocks
            .iter()
            .flat_map(|b| b.predictions.iter().copied())
            .collect()
    }
}

// =============================================================================
// EvalShard
// =============================================================================

struct EvalBlock {
    data: RowBlock,
    predictions: Vec<f32>,
}

/// Evaluation rows owned by one worker.
///
/// Predictions are updated by traversing each new tree on raw features.
pub struct EvalShard {
    worker: WorkerId,
    blocks: Vec<EvalBlock>,
}

impl OnWorker for EvalShard {
    fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl EvalShard {
    pub fn new(worker: WorkerId, blocks: Vec<RowBlock>) -> Self {
        Self {
            worker,
            blocks: blocks
                .into_iter()
                .map(|data| EvalBlock {
                    predictions: vec![0.0; data.n_rows()],
                    data,
                })
                .collect(),
        }
    }

    pub fn n_features(&self) -> Option<usize> {
        self.blocks.first().map(|b| b.data.features.ncols())
    }

    pub fn init_predictions(&mut self, base_score: f32) {
        self.blocks
            .par_iter_mut()
            .for_each(|b| b.predictions.fill(base_score));
    }

    pub fn add_tree(&mut self, tree: &Tree) {
        self.blocks.par_iter_mut().for_each(|block| {
            for (pred, row) in block.predictions.iter_mut().zip(block.data.features.rows()) {
                *pred += tree.predict_row(row);
            }
        });
    }

    pub fn metric_partial(&self, metric: &impl MetricFn) -> MetricPartial {
        self.blocks
            .par_iter()
            .map(|b| metric.partial(&b.predictions, b.data.targets.view(), b.data.weights()))
            .sum()
    }
}
