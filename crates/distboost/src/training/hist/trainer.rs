//! Distributed histogram trainer.
//!
//! The driver owns the tree being grown; workers own the rows. Each boosting
//! round:
//!
//! 1. every worker computes gradients for its rows,
//! 2. trees grow depth-wise: workers build histograms for the nodes of the
//!    current level, the driver sums them (allreduce), finds the best split per
//!    node and broadcasts the splits back so workers can repartition rows,
//! 3. workers add the new tree's leaf values to their running predictions,
//! 4. metrics are reduced per eval set and early stopping is consulted.
//!
//! Only the smaller child of each split gets a histogram built from rows; the
//! sibling is `parent - child`.

use std::collections::BTreeMap;

use super::shard::{EvalShard, NodeSplit, RowBlock, WorkerShard};
use super::split::{GainParams, find_best_split};
use super::{HistogramCuts, MAX_BINS, NodeHistogram, QuantileSketch};
use crate::array::{DArray1, DArray2};
use crate::cluster::{Client, Device, OnWorker, WorkerId};
use crate::error::{Error, Result};
use crate::model::ConfigError;
use crate::repr::{Forest, NodeId, Tree, TreeBuilder};
use crate::training::{
    EarlyStopAction, EarlyStopping, EvalsResult, GradStats, MetricFn, MetricValue, ObjectiveFn,
    TrainingLogger, Verbosity,
};

// =============================================================================
// HistParams
// =============================================================================

/// Parameters for distributed histogram training.
#[derive(Clone, Debug)]
pub struct HistParams {
    // --- Boosting parameters ---
    /// Number of boosting rounds (trees to train).
    pub n_estimators: usize,
    /// Learning rate (shrinkage).
    pub learning_rate: f32,

    // --- Tree structure ---
    /// Maximum tree depth (root is depth 0).
    pub max_depth: usize,
    /// Maximum number of histogram bins per feature.
    pub max_bin: usize,

    // --- Regularization ---
    pub gain: GainParams,

    // --- Early stopping ---
    /// Stop after this many rounds without improvement on the last eval set.
    /// 0 disables early stopping.
    pub early_stopping_rounds: usize,

    // --- Placement / logging ---
    /// Device every data-holding worker must be bound to.
    pub device: Device,
    pub verbosity: Verbosity,
}

impl Default for HistParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            max_bin: 256,
            gain: GainParams::default(),
            early_stopping_rounds: 0,
            device: Device::Cpu,
            verbosity: Verbosity::default(),
        }
    }
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub forest: Forest,
    pub evals_result: EvalsResult,
    /// Best round when early stopping was active.
    pub best_iteration: Option<usize>,
    pub best_score: Option<f64>,
    pub n_features: usize,
}

// =============================================================================
// HistTrainer
// =============================================================================

/// Evaluation state of one eval set.
enum EvalState {
    /// The eval set is the training data: reuse the training predictions.
    Train,
    Shards(Vec<EvalShard>),
}

/// A node waiting to be split or turned into a leaf.
struct FrontierNode {
    id: NodeId,
    stats: GradStats,
    hist: Option<NodeHistogram>,
}

struct SplitChildren {
    left: (NodeId, GradStats),
    right: (NodeId, GradStats),
    parent_hist: NodeHistogram,
}

impl SplitChildren {
    /// Child with the smaller hessian sum.
    fn smaller(&self) -> NodeId {
        if self.left.1.sum_hess <= self.right.1.sum_hess {
            self.left.0
        } else {
            self.right.0
        }
    }
}

/// Trains a [`Forest`] on data distributed over a cluster.
pub struct HistTrainer<O: ObjectiveFn, M: MetricFn> {
    client: Client,
    objective: O,
    metric: M,
    params: HistParams,
}

impl<O: ObjectiveFn, M: MetricFn> HistTrainer<O, M> {
    pub fn new(client: Client, objective: O, metric: M, params: HistParams) -> Self {
        Self {
            client,
            objective,
            metric,
            params,
        }
    }

    pub fn params(&self) -> &HistParams {
        &self.params
    }

    /// Train a forest on unweighted data.
    ///
    /// # Arguments
    ///
    /// * `x` - Features, `rows x features`
    /// * `y` - Targets, chunked like `x`
    /// * `evals` - Eval sets; their metrics are recorded as `validation_{i}`
    ///   and the last one drives early stopping
    pub fn train(
        &self,
        x: &DArray2,
        y: &DArray1,
        evals: &[(&DArray2, &DArray1)],
    ) -> Result<TrainOutput> {
        let evals: Vec<WeightedSet<'_>> = evals.iter().copied().map(WeightedSet::from).collect();
        self.train_weighted(WeightedSet::new(x, y), &evals)
    }

    /// Train a forest, scaling each row's gradients by its sample weight.
    ///
    /// Weights also enter the base score, the quantile sketch and every
    /// recorded metric.
    pub fn train_weighted(
        &self,
        train: WeightedSet<'_>,
        evals: &[WeightedSet<'_>],
    ) -> Result<TrainOutput> {
        let max_bin = self.params.max_bin;
        if !(2..=MAX_BINS).contains(&max_bin) {
            return Err(ConfigError::InvalidMaxBin(max_bin).into());
        }
        train.validate()?;
        let x = train.x;
        let n_features = x.shape()[1];
        if x.n_rows() == 0 || n_features == 0 {
            return Err(Error::EmptyDataset);
        }
        for eval in evals {
            eval.validate()?;
            if eval.x.shape()[1] != n_features {
                return Err(Error::FeatureMismatch {
                    expected: n_features,
                    got: eval.x.shape()[1],
                });
            }
        }

        let mut logger = TrainingLogger::new(self.params.verbosity);

        // --- Place data ---
        let mut shards: Vec<WorkerShard> = self
            .place(&train)?
            .into_iter()
            .map(|(worker, blocks)| WorkerShard::new(worker, blocks))
            .collect();
        self.check_devices(&shards)?;
        tracing::debug!(
            n_rows = x.n_rows(),
            n_features,
            n_shards = shards.len(),
            "training data placed"
        );

        // --- Quantize ---
        let cuts = self.build_cuts(&mut shards, n_features)?;
        self.client.map_shards(&mut shards, |_, shard| {
            shard.bin(&cuts);
            Ok(())
        })?;

        // --- Base score ---
        let objective = &self.objective;
        let base_score = objective.base_score(
            self.client
                .map_shards(&mut shards, |_, shard| Ok(shard.base_score_partial(objective)))?
                .into_iter()
                .sum(),
        );
        self.client.map_shards(&mut shards, |_, shard| {
            shard.init_predictions(base_score);
            Ok(())
        })?;

        // --- Eval sets ---
        let mut eval_states = evals
            .iter()
            .map(|eval| self.eval_state(&train, eval, base_score))
            .collect::<Result<Vec<_>>>()?;

        // --- Boosting ---
        let metric = &self.metric;
        let mut early_stopping =
            EarlyStopping::new(self.params.early_stopping_rounds, metric.higher_is_better());
        if early_stopping.is_enabled() && evals.is_empty() {
            logger.warn("early stopping needs at least one eval set; disabled");
            early_stopping = EarlyStopping::new(0, metric.higher_is_better());
        }

        let mut forest = Forest::new(base_score);
        let mut evals_result = EvalsResult::new();
        logger.start_training(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            let tree = self.grow_tree(round, &mut shards, &cuts, &logger)?;
            self.client.map_shards(&mut shards, |_, shard| {
                shard.update_predictions(&tree);
                Ok(())
            })?;

            let mut round_metrics = Vec::with_capacity(eval_states.len());
            for (set_idx, state) in eval_states.iter_mut().enumerate() {
                let partials = match state {
                    EvalState::Train => self
                        .client
                        .map_shards(&mut shards, |_, shard| Ok(shard.metric_partial(metric)))?,
                    EvalState::Shards(eval_shards) => {
                        self.client.map_shards(eval_shards, |_, shard| {
                            shard.add_tree(&tree);
                            Ok(shard.metric_partial(metric))
                        })?
                    }
                };
                let value = metric.finalize(partials.into_iter().sum());
                let set = EvalsResult::set_name(set_idx);
                evals_result.push(&set, metric.name(), value);
                round_metrics.push(MetricValue::new(
                    format!("{set}-{}", metric.name()),
                    value,
                    metric.higher_is_better(),
                ));
            }

            forest.push_tree(tree);
            logger.log_round(round, &round_metrics);

            if let Some(monitored) = round_metrics.last()
                && early_stopping.update(monitored.value) == EarlyStopAction::Stop
            {
                logger.log_early_stopping(round, early_stopping.best_round(), metric.name());
                break;
            }
        }

        let (best_iteration, best_score) = if early_stopping.is_enabled() {
            (Some(early_stopping.best_round()), early_stopping.best_value())
        } else {
            (None, None)
        };
        if let Some(best) = best_iteration {
            forest.truncate(best + 1);
        }
        logger.finish_training(forest.n_trees());

        Ok(TrainOutput {
            forest,
            evals_result,
            best_iteration,
            best_score,
            n_features,
        })
    }

    fn check_devices(&self, shards: &[WorkerShard]) -> Result<()> {
        let workers = self.client.workers()?;
        for shard in shards {
            let id = shard.worker();
            let info = workers
                .iter()
                .find(|w| w.id == id)
                .ok_or(Error::UnknownWorker(id))?;
            if !info.device.satisfies(self.params.device) {
                return Err(Error::DeviceUnavailable {
                    requested: self.params.device,
                    worker: id,
                    available: info.device,
                });
            }
        }
        Ok(())
    }

    /// Sketch on every worker, merge on the driver.
    fn build_cuts(&self, shards: &mut [WorkerShard], n_features: usize) -> Result<HistogramCuts> {
        let max_bin = self.params.max_bin;
        let sketches = self
            .client
            .map_shards(shards, |_, shard| Ok(shard.sketch(n_features, max_bin)))?;

        let mut merged = QuantileSketch::new(n_features, max_bin);
        for sketch in &sketches {
            merged.merge(sketch);
        }
        let cuts = merged.into_cuts();
        tracing::debug!(total_bins = cuts.total_bins(), "histogram cuts built");
        Ok(cuts)
    }

    /// Persist a set on the cluster and group its row blocks by worker.
    fn place(&self, set: &WeightedSet<'_>) -> Result<BTreeMap<WorkerId, Vec<RowBlock>>> {
        let x = self.client.persist(set.x)?;
        let y = self.client.persist_aligned(set.y, &x)?;
        let weight = set
            .weight
            .map(|w| self.client.persist_aligned(w, &x))
            .transpose()?;
        group_blocks(&x, &y, weight.as_ref())
    }

    fn eval_state(
        &self,
        train: &WeightedSet<'_>,
        eval: &WeightedSet<'_>,
        base_score: f32,
    ) -> Result<EvalState> {
        if eval.same_arrays(train) {
            return Ok(EvalState::Train);
        }

        let mut shards: Vec<EvalShard> = self
            .place(eval)?
            .into_iter()
            .map(|(worker, blocks)| EvalShard::new(worker, blocks))
            .collect();
        self.client.map_shards(&mut shards, |_, shard| {
            shard.init_predictions(base_score);
            Ok(())
        })?;
        Ok(EvalState::Shards(shards))
    }

    /// Build histograms for `nodes` on every worker and sum them in shard order.
    fn allreduce_histograms(
        &self,
        shards: &mut [WorkerShard],
        nodes: &[NodeId],
        cuts: &HistogramCuts,
    ) -> Result<Vec<NodeHistogram>> {
        let per_shard = self
            .client
            .map_shards(shards, |_, shard| Ok(shard.build_histograms(nodes, cuts)))?;

        let mut parts = per_shard.into_iter();
        let mut total = parts
            .next()
            .unwrap_or_else(|| vec![NodeHistogram::zeros(cuts.total_bins()); nodes.len()]);
        for part in parts {
            for (acc, hist) in total.iter_mut().zip(&part) {
                *acc += hist;
            }
        }
        Ok(total)
    }

    #[inline]
    fn leaf_value(&self, stats: GradStats) -> f32 {
        (self.params.gain.compute_leaf_weight(stats) * self.params.learning_rate as f64) as f32
    }

    /// Grow one tree depth-wise.
    fn grow_tree(
        &self,
        round: usize,
        shards: &mut [WorkerShard],
        cuts: &HistogramCuts,
        logger: &TrainingLogger,
    ) -> Result<Tree> {
        let objective = &self.objective;
        let root_stats: GradStats = self
            .client
            .map_shards(shards, |_, shard| Ok(shard.start_round(objective)))?
            .into_iter()
            .sum();

        let mut builder = TreeBuilder::new();
        let root_hist = self.allreduce_histograms(shards, &[0], cuts)?.pop();
        let mut frontier = vec![FrontierNode {
            id: 0,
            stats: root_stats,
            hist: root_hist,
        }];

        for depth in 0..self.params.max_depth {
            let mut splits = Vec::new();
            let mut children = Vec::new();
            let mut n_leaves = 0;

            for node in std::mem::take(&mut frontier) {
                if let Some(hist) = node.hist
                    && let Some(best) = find_best_split(&hist, cuts, node.stats, &self.params.gain)
                {
                    let (left, right) = builder.split(
                        node.id,
                        best.feature as u32,
                        best.threshold,
                        true,
                        best.gain as f32,
                        node.stats.sum_hess as f32,
                    );
                    splits.push(NodeSplit {
                        node: node.id,
                        feature: best.feature,
                        bin: best.bin as u8,
                        left,
                        right,
                    });
                    children.push(SplitChildren {
                        left: (left, best.left),
                        right: (right, best.right),
                        parent_hist: hist,
                    });
                } else {
                    builder.make_leaf(node.id, self.leaf_value(node.stats), node.stats.sum_hess as f32);
                    n_leaves += 1;
                }
            }
            logger.log_level(round, depth, splits.len(), n_leaves);

            if splits.is_empty() {
                break;
            }
            self.client.map_shards(shards, |_, shard| {
                shard.apply_splits(&splits);
                Ok(())
            })?;

            if depth + 1 == self.params.max_depth {
                // Children of the last level become leaves; no histograms needed.
                for c in children {
                    for (id, stats) in [c.left, c.right] {
                        frontier.push(FrontierNode { id, stats, hist: None });
                    }
                }
                break;
            }

            let smaller: Vec<NodeId> = children.iter().map(SplitChildren::smaller).collect();
            let small_hists = self.allreduce_histograms(shards, &smaller, cuts)?;
            for (c, small_hist) in children.into_iter().zip(small_hists) {
                let large_hist = NodeHistogram::subtract(&c.parent_hist, &small_hist);
                let (left_hist, right_hist) = if c.smaller() == c.left.0 {
                    (small_hist, large_hist)
                } else {
                    (large_hist, small_hist)
                };
                frontier.push(FrontierNode {
                    id: c.left.0,
                    stats: c.left.1,
                    hist: Some(left_hist),
                });
                frontier.push(FrontierNode {
                    id: c.right.0,
                    stats: c.right.1,
                    hist: Some(right_hist),
                });
            }
        }

        for node in frontier {
            builder.make_leaf(node.id, self.leaf_value(node.stats), node.stats.sum_hess as f32);
        }
        Ok(builder.build())
    }
}

// =============================================================================
// WeightedSet
// =============================================================================

/// Features, targets and optional sample weights of one data set.
///
/// All arrays must share the row partitioning of `x`.
#[derive(Debug, Clone, Copy)]
pub struct WeightedSet<'a> {
    pub x: &'a DArray2,
    pub y: &'a DArray1,
    pub weight: Option<&'a DArray1>,
}

impl<'a> WeightedSet<'a> {
    pub fn new(x: &'a DArray2, y: &'a DArray1) -> Self {
        Self { x, y, weight: None }
    }

    pub fn with_weight(mut self, weight: &'a DArray1) -> Self {
        self.weight = Some(weight);
        self
    }

    fn validate(&self) -> Result<()> {
        self.x.ensure_aligned(self.y)?;
        if let Some(weight) = self.weight {
            self.x.ensure_aligned(weight)?;
        }
        Ok(())
    }

    /// Whether both sets refer to the same named arrays.
    fn same_arrays(&self, other: &WeightedSet<'_>) -> bool {
        self.x.name() == other.x.name()
            && self.y.name() == other.y.name()
            && self.weight.map(|w| w.name()) == other.weight.map(|w| w.name())
    }
}

impl<'a> From<(&'a DArray2, &'a DArray1)> for WeightedSet<'a> {
    fn from((x, y): (&'a DArray2, &'a DArray1)) -> Self {
        Self::new(x, y)
    }
}

/// Pair up the resident blocks of `x`, `y` and the weights and group them by worker.
fn group_blocks(
    x: &DArray2,
    y: &DArray1,
    weight: Option<&DArray1>,
) -> Result<BTreeMap<WorkerId, Vec<RowBlock>>> {
    let mut by_worker: BTreeMap<WorkerId, Vec<RowBlock>> = BTreeMap::new();
    for (idx, (x_block, y_block)) in x.blocks().iter().zip(y.blocks()).enumerate() {
        let worker = x_block.affinity().unwrap_or_default();
        let mut block = RowBlock::new(x_block.materialize()?, y_block.materialize()?);
        if let Some(w_block) = weight.and_then(|w| w.blocks().get(idx)) {
            block = block.with_weights(w_block.materialize()?);
        }
        by_worker.entry(worker).or_default().push(block);
    }
    Ok(by_worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DArray;
    use crate::cluster::LocalCluster;
    use crate::training::{MetricFn, Rmse, SquaredLoss, WeightsView};
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2, Axis, s};

    fn step_data(n_rows: usize) -> (Array2<f32>, Array1<f32>) {
        let x = Array2::from_shape_fn((n_rows, 2), |(r, c)| if c == 0 { r as f32 } else { (r % 3) as f32 });
        let y = Array1::from_shape_fn(n_rows, |r| if r < n_rows / 2 { 0.0 } else { 10.0 });
        (x, y)
    }

    fn trainer(client: &Client, params: HistParams) -> HistTrainer<SquaredLoss, Rmse> {
        HistTrainer::new(client.clone(), SquaredLoss, Rmse, params)
    }

    #[test]
    fn test_params_default() {
        let params = HistParams::default();
        assert_eq!(params.n_estimators, 100);
        assert_relative_eq!(params.learning_rate, 0.3);
        assert_eq!(params.max_depth, 6);
        assert_eq!(params.max_bin, 256);
        assert_eq!(params.early_stopping_rounds, 0);
    }

    #[test]
    fn test_single_stump_learns_step() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(40);
        let x = DArray::from_array(x, 10).unwrap();
        let y = DArray::from_array(y, 10).unwrap();

        let params = HistParams {
            n_estimators: 1,
            learning_rate: 1.0,
            max_depth: 1,
            gain: GainParams {
                reg_lambda: 0.0,
                min_child_weight: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let out = trainer(&client, params).train(&x, &y, &[]).unwrap();

        assert_eq!(out.forest.n_trees(), 1);
        assert_relative_eq!(out.forest.base_score(), 5.0);
        let tree = out.forest.tree(0);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.split_index(0), 0);
        assert_eq!(tree.split_threshold(0), 20.0);

        let preds = out.forest.predict(client.compute(&x).unwrap().view());
        for (p, t) in preds.iter().zip(client.compute(&y).unwrap().iter()) {
            assert_relative_eq!(*p, *t, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_distributed_matches_single_worker() {
        let (x, y) = step_data(60);
        let params = HistParams {
            n_estimators: 5,
            max_depth: 3,
            ..Default::default()
        };

        let mut forests = Vec::new();
        for n_workers in [1, 3] {
            let cluster = LocalCluster::cpu(n_workers).unwrap();
            let client = Client::connect(&cluster).unwrap();
            let dx = DArray::from_array(x.clone(), 7).unwrap();
            let dy = DArray::from_array(y.clone(), 7).unwrap();
            forests.push(trainer(&client, params.clone()).train(&dx, &dy, &[]).unwrap().forest);
        }

        let preds: Vec<_> = forests.iter().map(|f| f.predict(x.view())).collect();
        for (a, b) in preds[0].iter().zip(preds[1].iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_records_history_per_eval_set() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(30);
        let dx = DArray::from_array(x.clone(), 10).unwrap();
        let dy = DArray::from_array(y.clone(), 10).unwrap();
        let vx = DArray::from_array(x, 8).unwrap();
        let vy = DArray::from_array(y, 8).unwrap();

        let params = HistParams {
            n_estimators: 4,
            ..Default::default()
        };
        let out = trainer(&client, params)
            .train(&dx, &dy, &[(&dx, &dy), (&vx, &vy)])
            .unwrap();

        let train_hist = out.evals_result.get("validation_0", "rmse").unwrap();
        let valid_hist = out.evals_result.get("validation_1", "rmse").unwrap();
        assert_eq!(train_hist.len(), 4);
        assert!(train_hist.windows(2).all(|w| w[1] <= w[0] + 1e-9));
        // Same rows, different chunking: identical metric values.
        for (a, b) in train_hist.iter().zip(valid_hist) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
        assert_eq!(out.best_iteration, None);
    }

    #[test]
    fn test_early_stopping_truncates_forest() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let client = Client::connect(&cluster).unwrap();
        // Constant target: nothing to learn after the base score.
        let x = DArray::from_array(Array2::from_shape_fn((20, 1), |(r, _)| r as f32), 5).unwrap();
        let y = DArray::from_array(Array1::from_elem(20, 3.0f32), 5).unwrap();

        let params = HistParams {
            n_estimators: 50,
            early_stopping_rounds: 2,
            ..Default::default()
        };
        let out = trainer(&client, params).train(&x, &y, &[(&x, &y)]).unwrap();

        assert_eq!(out.best_iteration, Some(0));
        assert_eq!(out.forest.n_trees(), 1);
        assert_eq!(out.evals_result.n_iterations(), 3);
    }

    #[test]
    fn test_rejects_empty_and_misaligned_data() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let t = trainer(&client, HistParams::default());

        let x = DArray::from_array(Array2::<f32>::zeros((0, 3)), 4).unwrap();
        let y = DArray::from_array(Array1::<f32>::zeros(0), 4).unwrap();
        assert!(matches!(t.train(&x, &y, &[]), Err(Error::EmptyDataset)));

        let x = DArray::from_array(Array2::<f32>::zeros((8, 3)), 4).unwrap();
        let y = DArray::from_array(Array1::<f32>::zeros(8), 3).unwrap();
        assert!(matches!(t.train(&x, &y, &[]), Err(Error::Misaligned { .. })));
    }

    #[test]
    fn test_device_mismatch_is_reported() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(10);
        let x = DArray::from_array(x, 5).unwrap();
        let y = DArray::from_array(y, 5).unwrap();

        let params = HistParams {
            device: Device::cuda(),
            ..Default::default()
        };
        let err = trainer(&client, params).train(&x, &y, &[]).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable { worker: 0, .. }));
    }

    #[test]
    fn test_rejects_max_bin_above_u8_range() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let x = Array2::from_shape_fn((400, 1), |(r, _)| r as f32);
        let y = Array1::from_shape_fn(400, |r| if r < 300 { 0.0 } else { 1.0 });
        let x = DArray::from_array(x, 100).unwrap();
        let y = DArray::from_array(y, 100).unwrap();

        let params = HistParams {
            n_estimators: 1,
            max_depth: 1,
            max_bin: 512,
            ..Default::default()
        };
        let err = trainer(&client, params).train(&x, &y, &[]).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidMaxBin(512))));
    }

    #[test]
    fn test_missing_values_train_and_predict_consistently() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (mut x, y) = step_data(50);
        for r in (0..50).step_by(5) {
            x[[r, 0]] = f32::NAN;
        }
        let dx = DArray::from_array(x.clone(), 10).unwrap();
        let dy = DArray::from_array(y.clone(), 10).unwrap();

        let params = HistParams {
            n_estimators: 5,
            max_depth: 3,
            ..Default::default()
        };
        let out = trainer(&client, params).train(&dx, &dy, &[(&dx, &dy)]).unwrap();

        let history = out.evals_result.get("validation_0", "rmse").unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.iter().all(|v| v.is_finite()));
        assert!(history[4] < history[0]);

        // Rows with NaN follow the default direction at prediction time,
        // which must agree with where bin 0 sent them during training.
        let preds = out.forest.predict(x.view());
        assert!(preds.iter().all(|p| p.is_finite()));
        let rmse = Rmse.compute(preds.as_slice().unwrap(), y.view(), WeightsView::None);
        assert_relative_eq!(rmse, history[4], epsilon = 1e-4);
    }

    #[test]
    fn test_unit_weights_match_unweighted() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(40);
        let dx = DArray::from_array(x.clone(), 10).unwrap();
        let dy = DArray::from_array(y, 10).unwrap();
        let dw = DArray::from_array(Array1::from_elem(40, 1.0f32), 10).unwrap();

        let params = HistParams {
            n_estimators: 3,
            max_depth: 2,
            ..Default::default()
        };
        let t = trainer(&client, params);
        let plain = t.train(&dx, &dy, &[(&dx, &dy)]).unwrap();
        let weighted_set = WeightedSet::new(&dx, &dy).with_weight(&dw);
        let weighted = t.train_weighted(weighted_set, &[weighted_set]).unwrap();

        assert_relative_eq!(plain.forest.base_score(), weighted.forest.base_score());
        for (a, b) in plain
            .forest
            .predict(x.view())
            .iter()
            .zip(weighted.forest.predict(x.view()).iter())
        {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
        let plain_hist = plain.evals_result.get("validation_0", "rmse").unwrap();
        let weighted_hist = weighted.evals_result.get("validation_0", "rmse").unwrap();
        for (a, b) in plain_hist.iter().zip(weighted_hist) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_integer_weights_match_repeated_rows() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(40);
        let weights = Array1::from_shape_fn(40, |r| if r < 10 { 2.0f32 } else { 1.0 });

        // Rows 0..10 appear twice.
        let x_rep = ndarray::concatenate(Axis(0), &[x.view(), x.slice(s![..10, ..])]).unwrap();
        let y_rep = ndarray::concatenate(Axis(0), &[y.view(), y.slice(s![..10])]).unwrap();

        let params = HistParams {
            n_estimators: 3,
            max_depth: 1,
            ..Default::default()
        };
        let t = trainer(&client, params);

        let dx = DArray::from_array(x.clone(), 10).unwrap();
        let dy = DArray::from_array(y, 10).unwrap();
        let dw = DArray::from_array(weights, 10).unwrap();
        let set = WeightedSet::new(&dx, &dy).with_weight(&dw);
        let weighted = t.train_weighted(set, &[set]).unwrap();

        let rx = DArray::from_array(x_rep, 10).unwrap();
        let ry = DArray::from_array(y_rep, 10).unwrap();
        let repeated = t.train(&rx, &ry, &[(&rx, &ry)]).unwrap();

        assert_relative_eq!(
            weighted.forest.base_score(),
            repeated.forest.base_score(),
            epsilon = 1e-5
        );
        for (a, b) in weighted
            .forest
            .predict(x.view())
            .iter()
            .zip(repeated.forest.predict(x.view()).iter())
        {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
        let weighted_hist = weighted.evals_result.get("validation_0", "rmse").unwrap();
        let repeated_hist = repeated.evals_result.get("validation_0", "rmse").unwrap();
        for (a, b) in weighted_hist.iter().zip(repeated_hist) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_misaligned_weights_are_rejected() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(20);
        let dx = DArray::from_array(x, 5).unwrap();
        let dy = DArray::from_array(y, 5).unwrap();
        let dw = DArray::from_array(Array1::from_elem(20, 1.0f32), 4).unwrap();

        let err = trainer(&client, HistParams::default())
            .train_weighted(WeightedSet::new(&dx, &dy).with_weight(&dw), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Misaligned { .. }));
    }

    #[test]
    fn test_reversed_target_layout_matches_standard_layout() {
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        let (x, y) = step_data(30);
        let mut reversed: Array1<f32> = y.iter().rev().copied().collect();
        reversed.invert_axis(Axis(0));
        assert!(reversed.as_slice().is_none());
        assert_eq!(reversed, y);

        let params = HistParams {
            n_estimators: 2,
            max_depth: 2,
            ..Default::default()
        };
        let t = trainer(&client, params);
        let dx = DArray::from_array(x.clone(), 10).unwrap();
        let standard = t
            .train(&dx, &DArray::from_array(y, 10).unwrap(), &[])
            .unwrap();
        let strided = t
            .train(&dx, &DArray::from_array(reversed, 10).unwrap(), &[])
            .unwrap();

        assert_eq!(
            standard.forest.predict(x.view()),
            strided.forest.predict(x.view())
        );
    }
}
