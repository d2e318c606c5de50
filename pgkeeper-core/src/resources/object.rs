use std::fmt::Display;

use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, Secret, Service},
};
use kube::core::ObjectMeta;

use super::annotations::read_spec_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    StatefulSet,
    Service,
    ConfigMap,
    Secret,
}

impl ObjectKind {
    /// Workload first, so pods stop before their configuration and credentials vanish.
    pub const TEARDOWN_ORDER: [ObjectKind; 4] = [
        ObjectKind::StatefulSet,
        ObjectKind::Service,
        ObjectKind::ConfigMap,
        ObjectKind::Secret,
    ];
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::Service => "Service",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Secret => "Secret",
        })
    }
}

/// Any of the objects provisioned for a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    StatefulSet(StatefulSet),
    Service(Service),
    ConfigMap(ConfigMap),
    Secret(Secret),
}

impl ManagedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ManagedObject::Secret(_) => ObjectKind::Secret,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ManagedObject::StatefulSet(object) => &object.metadata,
            ManagedObject::Service(object) => &object.metadata,
            ManagedObject::ConfigMap(object) => &object.metadata,
            ManagedObject::Secret(object) => &object.metadata,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    pub fn spec_hash(&self) -> Option<&str> {
        read_spec_hash(self.metadata())
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            ManagedObject::Secret(secret) => Some(secret),
            _ => None,
        }
    }
}

impl From<StatefulSet> for ManagedObject {
    fn from(value: StatefulSet) -> Self {
        ManagedObject::StatefulSet(value)
    }
}

impl From<Service> for ManagedObject {
    fn from(value: Service) -> Self {
        ManagedObject::Service(value)
    }
}

impl From<ConfigMap> for ManagedObject {
    fn from(value: ConfigMap) -> Self {
        ManagedObject::ConfigMap(value)
    }
}

impl From<Secret> for ManagedObject {
    fn from(value: Secret) -> Self {
        ManagedObject::Secret(value)
    }
}
