use std::{collections::HashMap, num::NonZeroU32, sync::Arc};

use log::warn;
use pgkeeper_core::{
    cluster::{
        state::{ClusterState, ClusterStatus},
        ClusterIdentity,
    },
    sharding::{worker_id, WorkerId},
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Worker {worker} doesn't own cluster '{identity}' (owned by worker {owner})!")]
    NotOwner {
        identity: ClusterIdentity,
        worker: WorkerId,
        owner: WorkerId,
    },
}

/// In-memory map of every known cluster.
///
/// Anyone may read a snapshot, writes only happen through a [`RegistryWriter`]
/// bound to the worker owning the cluster.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<ClusterIdentity, ClusterState>>,
}

impl ClusterRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the cluster's current state, later changes are not reflected in it.
    pub async fn get_cluster_state(&self, identity: &ClusterIdentity) -> Option<ClusterState> {
        self.clusters.read().await.get(identity).cloned()
    }

    pub async fn len(&self) -> usize {
        self.clusters.read().await.len()
    }
}

/// Write access to the registry entries owned by a single worker.
#[derive(Debug, Clone)]
pub struct RegistryWriter {
    registry: Arc<ClusterRegistry>,
    worker: WorkerId,
    workers: NonZeroU32,
}

impl RegistryWriter {
    pub(crate) fn new(registry: Arc<ClusterRegistry>, worker: WorkerId, workers: NonZeroU32) -> Self {
        Self {
            registry,
            worker,
            workers,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub async fn get(&self, identity: &ClusterIdentity) -> Option<ClusterState> {
        self.registry.get_cluster_state(identity).await
    }

    pub async fn put(&self, state: ClusterState) -> Result<(), RegistryError> {
        self.ensure_owner(&state.identity)?;

        self.registry
            .clusters
            .write()
            .await
            .insert(state.identity.clone(), state);

        Ok(())
    }

    pub async fn remove(&self, identity: &ClusterIdentity) -> Result<Option<ClusterState>, RegistryError> {
        self.ensure_owner(identity)?;

        Ok(self.registry.clusters.write().await.remove(identity))
    }

    /// Records a failure that happened outside of the regular reconciliation,
    /// creating the entry if the cluster wasn't known yet.
    pub async fn mark_failed(
        &self,
        identity: &ClusterIdentity,
        error: String,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(identity)?;

        let mut clusters = self.registry.clusters.write().await;
        let state = clusters
            .entry(identity.clone())
            .or_insert_with(|| ClusterState::new(identity.clone(), self.worker));

        state.status = ClusterStatus::Failed;
        state.last_error = Some(error);

        Ok(())
    }

    fn ensure_owner(&self, identity: &ClusterIdentity) -> Result<(), RegistryError> {
        let owner = worker_id(identity, self.workers);
        if owner != self.worker {
            warn!("Worker {} attempted to modify '{identity}' owned by worker {owner}!", self.worker);

            return Err(RegistryError::NotOwner {
                identity: identity.clone(),
                worker: self.worker,
                owner,
            });
        }

        Ok(())
    }
}
