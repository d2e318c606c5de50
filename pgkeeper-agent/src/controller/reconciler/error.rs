use std::time::Duration;

use pgkeeper_core::{
    resources::{cluster::ClusterReleaseBuilderError, ResourceGenerationError},
    roles::infrastructure::RoleError,
};
use thiserror::Error;

use crate::controller::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("Couldn't patch the resource! Reason: {}", .0)]
    KubeApiError(kube::Error),
    #[error("Couldn't prepare a cluster release! Reason: {}", .0)]
    ClusterReleaseBuilderError(ClusterReleaseBuilderError),
    #[error("Couldn't generate a release resource! Reason: {}", .0)]
    ClusterReleaseResourceGenerationError(ResourceGenerationError),
    #[error("Couldn't update the cluster registry! Reason: {}", .0)]
    RegistryError(RegistryError),
    #[error("Reconciliation didn't finish within {:?}!", .0)]
    Timeout(Duration),
    #[error("Couldn't read the infrastructure roles! Reason: {}", .0)]
    InfrastructureRolesUnavailable(RoleError),
}

impl From<RegistryError> for ReconcilerError {
    fn from(value: RegistryError) -> Self {
        ReconcilerError::RegistryError(value)
    }
}

impl From<ResourceGenerationError> for ReconcilerError {
    fn from(value: ResourceGenerationError) -> Self {
        ReconcilerError::ClusterReleaseResourceGenerationError(value)
    }
}
