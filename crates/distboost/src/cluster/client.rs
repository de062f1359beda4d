//! Client handle for submitting work to a cluster.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::{Array, Axis, Dimension, RemoveAxis};
use parking_lot::MappedRwLockReadGuard;
use rayon::prelude::*;

use super::local::{ClusterState, LocalCluster, Worker, WorkerId, WorkerInfo};
use super::{ClusterWatch, Device};
use crate::array::{Block, DArray};
use crate::error::{Error, Result};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// WorkerContext / OnWorker
// =============================================================================

/// What a task knows about the worker it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    pub id: WorkerId,
    pub device: Device,
    pub n_threads: usize,
}

impl WorkerContext {
    fn of(worker: &Worker) -> Self {
        Self {
            id: worker.info.id,
            device: worker.info.device,
            n_threads: worker.info.n_threads,
        }
    }
}

/// State that lives on a specific worker.
///
/// [`Client::map_shards`] runs each shard's task on the worker it names.
pub trait OnWorker {
    fn worker(&self) -> WorkerId;
}

// =============================================================================
// Client
// =============================================================================

pub(crate) struct ClientInner {
    id: u64,
    cluster: Arc<ClusterState>,
    closed: AtomicBool,
}

impl ClientInner {
    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(client = self.id, cluster = %self.cluster.name(), "client closed");
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle used to submit work to a [`LocalCluster`] and gather results.
///
/// Cloning is cheap and every clone shares the same connection. The
/// connection closes when [`Client::close`] is called or the last clone is
/// dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connect to a running cluster.
    pub fn connect(cluster: &LocalCluster) -> Result<Self> {
        let state = cluster.state();
        if !state.is_running() {
            return Err(Error::ClusterClosed);
        }

        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(client = id, cluster = %state.name(), "client connected");

        Ok(Self {
            inner: Arc::new(ClientInner {
                id,
                cluster: Arc::clone(state),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Close the connection for every clone of this client. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// A handle observing this client and its cluster.
    pub fn watch(&self) -> ClusterWatch {
        ClusterWatch::new(&self.inner.cluster, Some(&self.inner))
    }

    /// Number of live workers.
    pub fn n_workers(&self) -> Result<usize> {
        Ok(self.workers_guard()?.len())
    }

    /// Descriptions of the live workers.
    pub fn workers(&self) -> Result<Vec<WorkerInfo>> {
        Ok(self
            .workers_guard()?
            .iter()
            .map(|w| w.info.clone())
            .collect())
    }

    fn workers_guard(&self) -> Result<MappedRwLockReadGuard<'_, Vec<Worker>>> {
        if !self.inner.is_open() {
            return Err(Error::ClientClosed);
        }
        self.inner.cluster.workers()
    }

    // =========================================================================
    // Task submission
    // =========================================================================

    /// Run `f` on one worker's pool and wait for the result.
    pub fn submit<T, F>(&self, worker: WorkerId, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&WorkerContext) -> T + Send,
    {
        let workers = self.workers_guard()?;
        let target = workers.get(worker).ok_or(Error::UnknownWorker(worker))?;
        let ctx = WorkerContext::of(target);

        panic::catch_unwind(AssertUnwindSafe(|| target.pool.install(|| f(&ctx))))
            .map_err(|_| Error::WorkerPanicked(worker))
    }

    /// Run `f` once per shard, each on the worker the shard lives on.
    ///
    /// All shards run concurrently; the call returns when every task has
    /// finished. Results come back in shard order. The first failing task's
    /// error is returned.
    pub fn map_shards<S, T, F>(&self, shards: &mut [S], f: F) -> Result<Vec<T>>
    where
        S: OnWorker + Send,
        T: Send,
        F: Fn(&WorkerContext, &mut S) -> Result<T> + Sync,
    {
        let workers = self.workers_guard()?;
        let ids: Vec<WorkerId> = shards.iter().map(OnWorker::worker).collect();
        if let Some(&missing) = ids.iter().find(|&&id| id >= workers.len()) {
            return Err(Error::UnknownWorker(missing));
        }

        let workers: &[Worker] = &workers;
        let f = &f;
        let joined: Vec<std::thread::Result<Result<T>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter_mut()
                .map(|shard| {
                    let worker = &workers[shard.worker()];
                    scope.spawn(move || {
                        let ctx = WorkerContext::of(worker);
                        worker.pool.install(|| f(&ctx, shard))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        joined
            .into_iter()
            .zip(ids)
            .map(|(outcome, id)| outcome.map_err(|_| Error::WorkerPanicked(id))?)
            .collect()
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Materialize every block of `array` on a worker.
    ///
    /// Blocks go to their affinity worker when they have one, otherwise they
    /// are assigned round-robin by block index. Resident blocks are kept
    /// where they are. The result keeps the array's name.
    pub fn persist<D: Dimension>(&self, array: &DArray<D>) -> Result<DArray<D>> {
        let n_workers = self.n_workers()?;
        let targets: Vec<WorkerId> = array
            .blocks()
            .iter()
            .enumerate()
            .map(|(i, block)| {
                block
                    .affinity()
                    .filter(|&w| w < n_workers)
                    .unwrap_or(i % n_workers)
            })
            .collect();
        self.persist_onto(array, &targets)
    }

    /// Materialize `array` so block `i` lives on the same worker as block `i`
    /// of `like`.
    ///
    /// `like` must be persisted and have the same number of blocks. Resident
    /// blocks on another worker are moved.
    pub fn persist_aligned<D: Dimension, E: Dimension>(
        &self,
        array: &DArray<D>,
        like: &DArray<E>,
    ) -> Result<DArray<D>> {
        array.ensure_aligned(like)?;
        let n_workers = self.n_workers()?;
        let targets: Vec<WorkerId> = like
            .blocks()
            .iter()
            .enumerate()
            .map(|(i, block)| block.affinity().unwrap_or(i % n_workers))
            .collect();
        self.persist_onto(array, &targets)
    }

    fn persist_onto<D: Dimension>(
        &self,
        array: &DArray<D>,
        targets: &[WorkerId],
    ) -> Result<DArray<D>> {
        let mut jobs: Vec<PersistJob<D>> = Vec::new();
        let mut blocks: Vec<Option<Block<D>>> = (0..array.n_blocks()).map(|_| None).collect();

        for (idx, (block, &worker)) in array.blocks().iter().zip(targets).enumerate() {
            match block {
                Block::Resident { worker: owner, data } => {
                    if *owner != worker {
                        tracing::debug!(array = %array.name(), block = idx, from = owner, to = worker, "moving block");
                    }
                    blocks[idx] = Some(Block::Resident {
                        worker,
                        data: Arc::clone(data),
                    });
                }
                Block::Pending(_) => {
                    let job = match jobs.iter_mut().position(|j| j.worker == worker) {
                        Some(pos) => &mut jobs[pos],
                        None => {
                            jobs.push(PersistJob::new(worker));
                            jobs.last_mut().expect("job was just pushed")
                        }
                    };
                    job.pending.push((idx, block.clone()));
                }
            }
        }

        let computed = self.map_shards(&mut jobs, |_, job| job.run())?;
        for (worker, results) in jobs.iter().map(|j| j.worker).zip(computed) {
            for (idx, data) in results {
                blocks[idx] = Some(Block::Resident { worker, data });
            }
        }

        tracing::debug!(array = %array.name(), n_blocks = blocks.len(), "persisted");
        let blocks = blocks
            .into_iter()
            .map(|b| b.expect("every block is resident after persist"))
            .collect();
        Ok(array.with_blocks(blocks))
    }

    /// Gather an array into local memory, concatenating blocks along rows.
    pub fn compute<D: Dimension + RemoveAxis>(&self, array: &DArray<D>) -> Result<Array<f32, D>> {
        let persisted = self.persist(array)?;
        if persisted.n_blocks() == 0 {
            return Ok(Array::zeros(persisted.raw_dim()));
        }

        let parts = persisted
            .blocks()
            .iter()
            .map(Block::materialize)
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
        Ok(ndarray::concatenate(Axis(0), &views)?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("cluster", &self.inner.cluster.name())
            .field("open", &self.inner.is_open())
            .finish()
    }
}

// =============================================================================
// PersistJob
// =============================================================================

/// Pending blocks bound for one worker.
struct PersistJob<D: Dimension> {
    worker: WorkerId,
    pending: Vec<(usize, Block<D>)>,
}

impl<D: Dimension> PersistJob<D> {
    fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            pending: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<Vec<(usize, Arc<Array<f32, D>>)>> {
        self.pending
            .par_iter()
            .map(|(idx, block)| Ok((*idx, block.materialize()?)))
            .collect()
    }
}

impl<D: Dimension> OnWorker for PersistJob<D> {
    fn worker(&self) -> WorkerId {
        self.worker
    }
}
