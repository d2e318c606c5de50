use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, Secret, Service},
};
use kube::{
    api::{DeleteParams, PatchParams},
    Client,
};
use pgkeeper_core::{
    cluster::{ClusterIdentity, NamespacedName},
    kubernetes::operations::{
        apply_resource, apply_resource_status, list_resource_names, try_get_resource,
        try_remove_resource,
    },
    resources::{
        crd::v1alpha1::postgresql::{Postgresql, PostgresqlStatus},
        object::{ManagedObject, ObjectKind},
    },
    roles::store::{SecretStore, SecretStoreError},
};
use tokio::time::timeout;

use super::{
    reconciler::{context::ClusterObjects, error::ReconcilerError},
    CONTROLLER_FIELD_MANAGER,
};

/// [`ClusterObjects`] backed by the Kubernetes API, writing with server-side apply.
pub struct KubeClusterObjects {
    client: Client,
    patch_params: PatchParams,
}

impl KubeClusterObjects {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            patch_params: PatchParams::apply(CONTROLLER_FIELD_MANAGER).force(),
        }
    }
}

#[async_trait]
impl ClusterObjects for KubeClusterObjects {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, ReconcilerError> {
        let client = &self.client;
        let object = match kind {
            ObjectKind::StatefulSet => try_get_resource::<StatefulSet>(client, name, namespace)
                .await
                .map(|object| object.map(ManagedObject::from)),
            ObjectKind::Service => try_get_resource::<Service>(client, name, namespace)
                .await
                .map(|object| object.map(ManagedObject::from)),
            ObjectKind::ConfigMap => try_get_resource::<ConfigMap>(client, name, namespace)
                .await
                .map(|object| object.map(ManagedObject::from)),
            ObjectKind::Secret => try_get_resource::<Secret>(client, name, namespace)
                .await
                .map(|object| object.map(ManagedObject::from)),
        };

        object.map_err(ReconcilerError::KubeApiError)
    }

    async fn apply(&self, object: &ManagedObject) -> Result<(), ReconcilerError> {
        let name = object.name().ok_or(ReconcilerError::MissingObjectMetadata)?;
        let namespace = object
            .namespace()
            .ok_or(ReconcilerError::MissingObjectMetadata)?;
        let client = &self.client;
        let params = &self.patch_params;

        let result = match object {
            ManagedObject::StatefulSet(resource) => {
                apply_resource(client, name, namespace, resource, params)
                    .await
                    .map(|_| ())
            }
            ManagedObject::Service(resource) => {
                apply_resource(client, name, namespace, resource, params)
                    .await
                    .map(|_| ())
            }
            ManagedObject::ConfigMap(resource) => {
                apply_resource(client, name, namespace, resource, params)
                    .await
                    .map(|_| ())
            }
            ManagedObject::Secret(resource) => {
                apply_resource(client, name, namespace, resource, params)
                    .await
                    .map(|_| ())
            }
        };

        result.map_err(ReconcilerError::KubeApiError)
    }

    async fn delete(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ReconcilerError> {
        let client = &self.client;
        let params = DeleteParams::background();

        let result = match kind {
            ObjectKind::StatefulSet => {
                try_remove_resource::<StatefulSet>(client, name, namespace, &params).await
            }
            ObjectKind::Service => {
                try_remove_resource::<Service>(client, name, namespace, &params).await
            }
            ObjectKind::ConfigMap => {
                try_remove_resource::<ConfigMap>(client, name, namespace, &params).await
            }
            ObjectKind::Secret => {
                try_remove_resource::<Secret>(client, name, namespace, &params).await
            }
        };

        result.map_err(ReconcilerError::KubeApiError)
    }

    async fn list_names(
        &self,
        kind: ObjectKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ReconcilerError> {
        let client = &self.client;

        let result = match kind {
            ObjectKind::StatefulSet => {
                list_resource_names::<StatefulSet>(client, namespace, labels).await
            }
            ObjectKind::Service => list_resource_names::<Service>(client, namespace, labels).await,
            ObjectKind::ConfigMap => {
                list_resource_names::<ConfigMap>(client, namespace, labels).await
            }
            ObjectKind::Secret => list_resource_names::<Secret>(client, namespace, labels).await,
        };

        result.map_err(ReconcilerError::KubeApiError)
    }

    async fn patch_status(
        &self,
        identity: &ClusterIdentity,
        status: &PostgresqlStatus,
    ) -> Result<(), ReconcilerError> {
        let result = apply_resource_status::<Postgresql, PostgresqlStatus>(
            &self.client,
            status,
            identity.name(),
            identity.namespace(),
            &PatchParams::default(),
        )
        .await;

        match result {
            Ok(_) => Ok(()),
            // the resource is already gone
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(error) => Err(ReconcilerError::KubeApiError(error)),
        }
    }
}

/// [`SecretStore`] reading secrets through the Kubernetes API.
pub struct KubeSecretStore {
    client: Client,
    request_timeout: Duration,
}

impl KubeSecretStore {
    pub fn new(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret(
        &self,
        secret: &NamespacedName,
    ) -> Result<BTreeMap<String, Vec<u8>>, SecretStoreError> {
        let request = try_get_resource::<Secret>(&self.client, secret.name(), secret.namespace());

        match timeout(self.request_timeout, request).await {
            Err(_) => Err(SecretStoreError::Timeout),
            Ok(Err(error)) => Err(SecretStoreError::Api(error.to_string())),
            Ok(Ok(None)) => Err(SecretStoreError::NotFound),
            Ok(Ok(Some(secret))) => Ok(secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()),
        }
    }
}
