use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use pgkeeper_core::{
    cluster::ClusterIdentity,
    config::OperatorConfig,
    resources::{
        crd::v1alpha1::postgresql::PostgresqlStatus,
        object::{ManagedObject, ObjectKind},
    },
    roles::store::SecretStore,
};

use super::error::ReconcilerError;

/// Object API the reconciler converges clusters through.
#[async_trait]
pub trait ClusterObjects: Send + Sync {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, ReconcilerError>;

    /// Creates or overwrites the object with the given content.
    async fn apply(&self, object: &ManagedObject) -> Result<(), ReconcilerError>;

    /// Removes the object, an already absent one counts as removed.
    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str)
        -> Result<(), ReconcilerError>;

    async fn list_names(
        &self,
        kind: ObjectKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ReconcilerError>;

    async fn patch_status(
        &self,
        identity: &ClusterIdentity,
        status: &PostgresqlStatus,
    ) -> Result<(), ReconcilerError>;
}

pub struct ReconcilerContext {
    pub objects: Arc<dyn ClusterObjects>,
    pub secrets: Arc<dyn SecretStore>,
    pub config: Arc<OperatorConfig>,
}
