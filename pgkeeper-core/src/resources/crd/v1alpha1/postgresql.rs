use std::{collections::BTreeMap, fmt::Display};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub const DEFAULT_POSTGRES_VERSION: &str = "16";

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "pgkeeper.dev",
    version = "v1alpha1",
    kind = "Postgresql",
    namespaced,
    status = "PostgresqlStatus",
    shortname = "pg",
    derive = "Default"
)]
pub struct PostgresqlSpec {
    /// team owning this cluster, used as a label on every generated object
    pub team_id: String,
    /// major PostgreSQL version, defaults to 16
    pub postgres_version: Option<String>,
    /// number of database pods
    pub number_of_instances: i32,
    /// size of the data volume of each pod, e.g. "10Gi"
    pub volume_size: String,
    /// roles declared by the manifest, mapped to their flags (e.g. "superuser", "createdb")
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
    /// postgresql.conf parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// whether to expose replicas through a separate service
    #[serde(default)]
    pub enable_replica_service: bool,
}

impl PostgresqlSpec {
    pub fn postgres_version(&self) -> &str {
        self.postgres_version
            .as_deref()
            .unwrap_or(DEFAULT_POSTGRES_VERSION)
    }
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlStatus {
    pub state: PostgresqlState,
    /// last reconciliation error, if the cluster is failing
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum PostgresqlState {
    #[default]
    Unknown,
    Creating,
    Syncing,
    Running,
    Deleting,
    Failed,
}

impl Display for PostgresqlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PostgresqlState::Unknown => "Unknown",
            PostgresqlState::Creating => "Creating",
            PostgresqlState::Syncing => "Syncing",
            PostgresqlState::Running => "Running",
            PostgresqlState::Deleting => "Deleting",
            PostgresqlState::Failed => "Failed",
        })
    }
}
