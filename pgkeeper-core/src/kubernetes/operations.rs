use std::{collections::BTreeMap, fmt::Debug};

use anyhow::{anyhow, Context};
use k8s_openapi::{
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    serde::{de::DeserializeOwned, Serialize},
    NamespaceResourceScope,
};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams},
    Api, Client, Resource,
};
use log::{debug, info};
use serde_json::json;

use crate::helpers::pretty_type_name;

pub async fn apply_crd(
    client: &Client,
    crd: &CustomResourceDefinition,
    patch_params: &PatchParams,
) -> anyhow::Result<()> {
    let crd_name = crd
        .metadata
        .name
        .as_ref()
        .ok_or_else(|| anyhow!("CRD is missing a name!"))?;
    let crd_apiversions = crd
        .spec
        .versions
        .iter()
        .map(|version| version.name.as_str())
        .collect::<Vec<&str>>()
        .join(", ");

    info!("Applying {crd_name} ({crd_apiversions}) CRD...");

    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    crd_api
        .patch(crd_name, patch_params, &Patch::Apply(crd))
        .await
        .context(format!(
            "Unable to apply {crd_name} ({crd_apiversions}) CRD!"
        ))?;

    Ok(())
}

pub async fn try_get_resource<T>(
    client: &Client,
    name: &str,
    namespace: &str,
) -> Result<Option<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    api.get_opt(name).await
}

/// Server-side applies `resource`; applying an identical object is a no-op on the API server.
pub async fn apply_resource<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    resource: &T,
    patch_params: &PatchParams,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + Clone
        + DeserializeOwned
        + Debug,
{
    debug!(
        "Applying '{name}' {} in '{namespace}' namespace...",
        pretty_type_name::<T>()
    );

    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    api.patch(name, patch_params, &Patch::Apply(resource)).await
}

pub async fn apply_resource_status<T, S>(
    client: &Client,
    status: &S,
    name: &str,
    namespace: &str,
    patch_params: &PatchParams,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "status": status });

    api.patch_status(name, patch_params, &Patch::Merge(&patch))
        .await
}

/// Removes a resource, treating an already missing one as removed.
pub async fn try_remove_resource<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    delete_params: &DeleteParams,
) -> Result<(), kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    info!(
        "Removing '{name}' {} from '{namespace}' namespace...",
        pretty_type_name::<T>()
    );

    match api.delete(name, delete_params).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(error) => Err(error),
    }
}

pub async fn list_resource_names<T>(
    client: &Client,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<String>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let selector = labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    let resources = api
        .list_metadata(&ListParams::default().labels(&selector))
        .await?;

    Ok(resources
        .items
        .into_iter()
        .filter_map(|resource| resource.metadata.name)
        .collect())
}
