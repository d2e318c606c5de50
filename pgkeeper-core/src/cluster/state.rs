use std::fmt::Display;

use crate::{
    resources::crd::v1alpha1::postgresql::{PostgresqlSpec, PostgresqlState},
    sharding::WorkerId,
};

use super::ClusterIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Created,
    Syncing,
    Running,
    Deleting,
    Failed,
}

impl Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ClusterStatus::Created => "Created",
            ClusterStatus::Syncing => "Syncing",
            ClusterStatus::Running => "Running",
            ClusterStatus::Deleting => "Deleting",
            ClusterStatus::Failed => "Failed",
        })
    }
}

impl From<ClusterStatus> for PostgresqlState {
    fn from(value: ClusterStatus) -> Self {
        match value {
            ClusterStatus::Created => PostgresqlState::Creating,
            ClusterStatus::Syncing => PostgresqlState::Syncing,
            ClusterStatus::Running => PostgresqlState::Running,
            ClusterStatus::Deleting => PostgresqlState::Deleting,
            ClusterStatus::Failed => PostgresqlState::Failed,
        }
    }
}

/// Controller-side view of a single cluster, as kept in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterState {
    pub identity: ClusterIdentity,
    /// the spec of the last successful convergence, never the one of a failed attempt
    pub last_applied: Option<PostgresqlSpec>,
    pub status: ClusterStatus,
    pub last_error: Option<String>,
    pub worker: WorkerId,
    /// non-fatal infrastructure role problems seen during the last credential sync
    pub role_errors: Vec<String>,
}

impl ClusterState {
    pub fn new(identity: ClusterIdentity, worker: WorkerId) -> Self {
        Self {
            identity,
            last_applied: None,
            status: ClusterStatus::Created,
            last_error: None,
            worker,
            role_errors: Vec::new(),
        }
    }
}
