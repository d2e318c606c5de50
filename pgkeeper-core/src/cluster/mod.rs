use std::{fmt::Display, str::FromStr};

use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use thiserror::Error;

pub mod event;
pub mod state;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Immutable (namespace, name) pair identifying a namespaced object.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespacedName {
    namespace: String,
    name: String,
}

/// Clusters are keyed by the namespaced name of their resource.
pub type ClusterIdentity = NamespacedName;

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<T: Resource>(resource: &T) -> Option<Self> {
        let meta = resource.meta();

        Some(Self::new(
            meta.namespace.as_deref()?,
            meta.name.as_deref()?,
        ))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// An unnamed reference points at nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespacedNameParseError {
    #[error("Name is empty!")]
    Empty,
    #[error("'{}' is not a valid namespace/name pair!", .0)]
    Malformed(String),
}

impl FromStr for NamespacedName {
    type Err = NamespacedNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NamespacedNameParseError::Empty);
        }

        match s.split_once('/') {
            None => Ok(Self::new(DEFAULT_NAMESPACE, s)),
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            Some(_) => Err(NamespacedNameParseError::Malformed(s.to_owned())),
        }
    }
}

/// Resolves the cluster a pod belongs to from its cluster name label.
pub fn pod_cluster_identity(pod: &Pod, cluster_name_label: &str) -> Option<ClusterIdentity> {
    let cluster_name = pod.metadata.labels.as_ref()?.get(cluster_name_label)?;
    let namespace = pod.metadata.namespace.as_deref()?;

    if cluster_name.is_empty() {
        return None;
    }

    Some(ClusterIdentity::new(namespace, cluster_name))
}
