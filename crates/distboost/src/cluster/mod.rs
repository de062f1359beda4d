//! Local compute cluster and the client used to drive it.
//!
//! - [`LocalCluster`]: owns a set of device-bound workers
//! - [`Client`]: submits tasks and materializes distributed arrays
//! - [`ClusterWatch`]: observes lifecycle without keeping anything alive

mod client;
mod device;
mod local;

use std::sync::{Arc, Weak};

pub use client::{Client, OnWorker, WorkerContext};
pub use device::Device;
pub use local::{ClusterConfig, ClusterConfigBuilder, LocalCluster, WorkerId, WorkerInfo};

pub(crate) use client::ClientInner;
pub(crate) use local::ClusterState;

/// Non-owning view of a cluster (and optionally a client).
///
/// Useful to check that resources were released after a scope ends.
#[derive(Debug, Clone)]
pub struct ClusterWatch {
    cluster: Weak<ClusterState>,
    client: Option<Weak<ClientInner>>,
}

impl ClusterWatch {
    pub(crate) fn new(cluster: &Arc<ClusterState>, client: Option<&Arc<ClientInner>>) -> Self {
        Self {
            cluster: Arc::downgrade(cluster),
            client: client.map(Arc::downgrade),
        }
    }

    /// Whether the cluster still has live workers.
    pub fn is_cluster_running(&self) -> bool {
        self.cluster
            .upgrade()
            .is_some_and(|state| state.is_running())
    }

    /// Whether the watched client is still open.
    ///
    /// Always `false` for a watch created from a cluster.
    pub fn is_client_open(&self) -> bool {
        self.client
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|inner| inner.is_open())
    }
}
