use crate::resources::crd::v1alpha1::postgresql::PostgresqlSpec;

use super::ClusterIdentity;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// first sighting of a cluster
    Add(PostgresqlSpec),
    /// the desired spec changed
    Update(PostgresqlSpec),
    /// the cluster resource is gone
    Delete,
    /// periodic or forced reconciliation, optionally carrying the latest known spec
    Sync(Option<PostgresqlSpec>),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Add(_) => "add",
            EventKind::Update(_) => "update",
            EventKind::Delete => "delete",
            EventKind::Sync(_) => "sync",
        }
    }

    pub fn spec(&self) -> Option<&PostgresqlSpec> {
        match self {
            EventKind::Add(spec) | EventKind::Update(spec) => Some(spec),
            EventKind::Sync(spec) => spec.as_ref(),
            EventKind::Delete => None,
        }
    }
}

/// A unit of work for the worker owning `identity`.
///
/// The sequence number is zero until the dispatcher stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEvent {
    sequence: u64,
    identity: ClusterIdentity,
    kind: EventKind,
}

impl ClusterEvent {
    pub fn new(identity: ClusterIdentity, kind: EventKind) -> Self {
        Self {
            sequence: 0,
            identity,
            kind,
        }
    }

    pub fn add(identity: ClusterIdentity, spec: PostgresqlSpec) -> Self {
        Self::new(identity, EventKind::Add(spec))
    }

    pub fn update(identity: ClusterIdentity, spec: PostgresqlSpec) -> Self {
        Self::new(identity, EventKind::Update(spec))
    }

    pub fn delete(identity: ClusterIdentity) -> Self {
        Self::new(identity, EventKind::Delete)
    }

    pub fn sync(identity: ClusterIdentity, spec: Option<PostgresqlSpec>) -> Self {
        Self::new(identity, EventKind::Sync(spec))
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;

        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn into_parts(self) -> (u64, ClusterIdentity, EventKind) {
        (self.sequence, self.identity, self.kind)
    }
}
