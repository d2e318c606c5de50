use std::{env::var, process::exit};

use anyhow::anyhow;
use controller::{main_controller, CONTROLLER_FIELD_MANAGER};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::PatchParams, Client};
use pgkeeper_core::{
    config::{configmap_reference, OperatorConfig},
    kubernetes::operations::try_get_resource,
    resources::crd::v1alpha1::create_v1alpha1_crds,
};

mod controller;

#[tokio::main]
async fn main() {
    configure_logger();

    let client = create_client().await;
    let config = get_config(&client).await;

    if config.enable_crd_registration {
        register_crds(&client).await;
    }

    main_controller(client, config).await;
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            log::error!("Couldn't create client! {error:?}");
            exit(6)
        }
    }
}

async fn get_config(client: &Client) -> OperatorConfig {
    match load_config(client).await {
        Ok(config) => config,
        Err(error) => {
            log::error!("Couldn't load the operator configuration! {error:#}");
            exit(7)
        }
    }
}

async fn load_config(client: &Client) -> anyhow::Result<OperatorConfig> {
    let Some(reference) = configmap_reference(|key| var(key).ok())? else {
        return Ok(OperatorConfig::from_env()?);
    };

    log::info!("Loading the operator configuration from '{reference}' ConfigMap...");

    let configmap =
        try_get_resource::<ConfigMap>(client, reference.name(), reference.namespace())
            .await?
            .ok_or_else(|| anyhow!("ConfigMap '{reference}' doesn't exist!"))?;

    Ok(OperatorConfig::from_configmap(&configmap)?)
}

async fn register_crds(client: &Client) {
    let patch_params = PatchParams::apply(CONTROLLER_FIELD_MANAGER).force();

    if let Err(error) = create_v1alpha1_crds(client, &patch_params).await {
        log::error!("Couldn't register the Postgresql CRD! {error:?}");
        exit(8)
    }
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init()
}
