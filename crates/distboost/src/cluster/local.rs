//! In-process cluster of device-bound workers.
//!
//! A [`LocalCluster`] provisions a fixed set of workers, each owning its own
//! rayon thread pool and bound to a [`Device`]. The cluster is torn down when
//! [`LocalCluster::close`] is called or the handle is dropped, whichever comes
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bon::Builder;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use super::{ClusterWatch, Device};
use crate::error::{Error, Result};
use crate::model::ConfigError;

/// Index of a worker within its cluster.
pub type WorkerId = usize;

// =============================================================================
// ClusterConfig
// =============================================================================

/// Configuration for a [`LocalCluster`].
///
/// # Example
///
/// ```
/// use distboost::cluster::ClusterConfig;
///
/// // Two accelerator-bound workers, two threads each.
/// let config = ClusterConfig::builder()
///     .device_ordinals(vec![0, 1])
///     .threads_per_worker(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.resolved_n_workers(), 2);
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ClusterConfig {
    /// Number of workers. Defaults to one per device ordinal, or 1.
    pub n_workers: Option<usize>,

    /// Threads per worker pool. Defaults to the available parallelism split
    /// evenly across workers.
    pub threads_per_worker: Option<usize>,

    /// Accelerator ordinals, one per worker. `None` provisions CPU workers.
    pub device_ordinals: Option<Vec<u32>>,

    /// Cluster name, used in worker thread names and logs.
    #[builder(into, default = String::from("local"))]
    pub name: String,
}

impl<S: cluster_config_builder::IsComplete> ClusterConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> std::result::Result<ClusterConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ClusterConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.n_workers == Some(0) {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if self.threads_per_worker == Some(0) {
            return Err(ConfigError::InvalidThreadCount);
        }
        if let Some(ordinals) = &self.device_ordinals {
            if ordinals.is_empty() {
                return Err(ConfigError::InvalidWorkerCount);
            }
            if let Some(n_workers) = self.n_workers
                && n_workers != ordinals.len()
            {
                return Err(ConfigError::OrdinalCountMismatch {
                    n_ordinals: ordinals.len(),
                    n_workers,
                });
            }
        }
        Ok(())
    }

    /// Number of workers the cluster will start.
    pub fn resolved_n_workers(&self) -> usize {
        self.n_workers
            .or_else(|| self.device_ordinals.as_ref().map(Vec::len))
            .unwrap_or(1)
    }

    /// Threads each worker pool will get.
    pub fn resolved_threads_per_worker(&self) -> usize {
        self.threads_per_worker.unwrap_or_else(|| {
            let available = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (available / self.resolved_n_workers()).max(1)
        })
    }

    /// Device for the worker at `id`.
    fn device_for(&self, id: WorkerId) -> Device {
        match &self.device_ordinals {
            Some(ordinals) => Device::Cuda { ordinal: ordinals[id] },
            None => Device::Cpu,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Workers
// =============================================================================

/// Public description of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub name: String,
    pub device: Device,
    pub n_threads: usize,
}

/// A worker: its description plus the pool that runs its tasks.
pub(crate) struct Worker {
    pub(crate) info: WorkerInfo,
    pub(crate) pool: rayon::ThreadPool,
}

impl Worker {
    fn spawn(cluster: &str, id: WorkerId, device: Device, n_threads: usize) -> Result<Self> {
        let name = format!("{cluster}-worker-{id}");
        let thread_prefix = name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(move |i| format!("{thread_prefix}-{i}"))
            .build()?;

        Ok(Self {
            info: WorkerInfo {
                id,
                name,
                device,
                n_threads,
            },
            pool,
        })
    }
}

// =============================================================================
// ClusterState
// =============================================================================

/// State shared between the cluster handle, its clients and watches.
pub(crate) struct ClusterState {
    name: String,
    workers: RwLock<Option<Vec<Worker>>>,
    running: AtomicBool,
}

impl ClusterState {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Read access to the live workers.
    ///
    /// Holding the guard keeps the cluster from shutting down underneath a
    /// running task; `shutdown` waits for all guards to be released.
    pub(crate) fn workers(&self) -> Result<MappedRwLockReadGuard<'_, Vec<Worker>>> {
        RwLockReadGuard::try_map(self.workers.read(), Option::as_ref)
            .map_err(|_| Error::ClusterClosed)
    }

    /// Stop all workers. Returns `false` if the cluster was already stopped.
    fn shutdown(&self) -> bool {
        let workers = self.workers.write().take();
        self.running.store(false, Ordering::Release);
        match workers {
            Some(workers) => {
                let n_workers = workers.len();
                drop(workers);
                tracing::info!(cluster = %self.name, n_workers, "cluster closed");
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// LocalCluster
// =============================================================================

/// A cluster of in-process workers.
///
/// The handle owns the cluster: dropping it shuts every worker down, so
/// binding it in a scope gives guaranteed teardown on every exit path.
///
/// # Example
///
/// ```
/// use distboost::cluster::{Client, LocalCluster};
///
/// let cluster = LocalCluster::cpu(2).unwrap();
/// let client = Client::connect(&cluster).unwrap();
/// assert_eq!(client.n_workers().unwrap(), 2);
/// // `client` is dropped first, then `cluster`.
/// ```
pub struct LocalCluster {
    state: Arc<ClusterState>,
}

impl LocalCluster {
    /// Start a cluster from a configuration.
    ///
    /// The configuration is validated first, so a literal `ClusterConfig`
    /// gets the same checks as one built through the builder.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let n_workers = config.resolved_n_workers();
        if n_workers == 0 {
            return Err(Error::NoWorkers);
        }
        let n_threads = config.resolved_threads_per_worker();

        let workers = (0..n_workers)
            .map(|id| Worker::spawn(&config.name, id, config.device_for(id), n_threads))
            .collect::<Result<Vec<_>>>()?;

        for worker in &workers {
            tracing::debug!(
                worker = %worker.info.name,
                device = %worker.info.device,
                n_threads,
                "worker started"
            );
        }
        tracing::info!(cluster = %config.name, n_workers, n_threads, "cluster started");

        Ok(Self {
            state: Arc::new(ClusterState {
                name: config.name,
                workers: RwLock::new(Some(workers)),
                running: AtomicBool::new(true),
            }),
        })
    }

    /// Start a cluster with one accelerator worker on device ordinal 0.
    pub fn accelerated() -> Result<Self> {
        let config = ClusterConfig::builder().device_ordinals(vec![0]).build()?;
        Self::new(config)
    }

    /// Start a cluster of `n_workers` CPU workers.
    pub fn cpu(n_workers: usize) -> Result<Self> {
        let config = ClusterConfig::builder().n_workers(n_workers).build()?;
        Self::new(config)
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Descriptions of the live workers (empty once closed).
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.state
            .workers()
            .map(|workers| workers.iter().map(|w| w.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether the cluster is still accepting work.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Shut down all workers. Idempotent.
    ///
    /// Waits for tasks that are currently running to finish.
    pub fn close(&self) {
        self.state.shutdown();
    }

    /// A handle that observes the cluster's lifecycle without owning it.
    pub fn watch(&self) -> ClusterWatch {
        ClusterWatch::new(&self.state, None)
    }

    pub(crate) fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.state.shutdown();
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("name", &self.state.name())
            .field("running", &self.state.is_running())
            .field("workers", &self.workers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.resolved_n_workers(), 1);
        assert!(config.resolved_threads_per_worker() >= 1);
        assert_eq!(config.name, "local");
    }

    #[test]
    fn config_rejects_zero_workers() {
        let result = ClusterConfig::builder().n_workers(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidWorkerCount)));
    }

    #[test]
    fn config_rejects_zero_threads() {
        let result = ClusterConfig::builder().threads_per_worker(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidThreadCount)));
    }

    #[test]
    fn config_rejects_ordinal_mismatch() {
        let result = ClusterConfig::builder()
            .n_workers(3)
            .device_ordinals(vec![0, 1])
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::OrdinalCountMismatch { n_ordinals: 2, n_workers: 3 })
        ));
    }

    #[test]
    fn new_validates_literal_config() {
        let config = ClusterConfig {
            n_workers: Some(3),
            threads_per_worker: None,
            device_ordinals: Some(vec![0]),
            name: "local".into(),
        };
        assert!(matches!(
            LocalCluster::new(config),
            Err(Error::Config(ConfigError::OrdinalCountMismatch { n_ordinals: 1, n_workers: 3 }))
        ));

        let config = ClusterConfig {
            n_workers: None,
            threads_per_worker: Some(0),
            device_ordinals: None,
            name: "local".into(),
        };
        assert!(matches!(
            LocalCluster::new(config),
            Err(Error::Config(ConfigError::InvalidThreadCount))
        ));
    }

    #[test]
    fn accelerated_cluster_binds_devices() {
        let cluster = LocalCluster::new(
            ClusterConfig::builder()
                .device_ordinals(vec![0, 1])
                .threads_per_worker(1)
                .build()
                .unwrap(),
        )
        .unwrap();

        let workers = cluster.workers();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].device, Device::Cuda { ordinal: 0 });
        assert_eq!(workers[1].device, Device::Cuda { ordinal: 1 });
        assert_eq!(workers[1].n_threads, 1);
    }

    #[test]
    fn close_is_idempotent() {
        let cluster = LocalCluster::cpu(1).unwrap();
        assert!(cluster.is_running());
        cluster.close();
        cluster.close();
        assert!(!cluster.is_running());
        assert!(cluster.workers().is_empty());
    }

    #[test]
    fn drop_shuts_down() {
        let cluster = LocalCluster::cpu(1).unwrap();
        let watch = cluster.watch();
        assert!(watch.is_cluster_running());
        drop(cluster);
        assert!(!watch.is_cluster_running());
    }
}
