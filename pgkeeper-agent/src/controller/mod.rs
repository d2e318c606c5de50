use std::sync::Arc;

use kube::Client;
use log::{error, info};
use pgkeeper_core::config::OperatorConfig;
use tokio_util::sync::CancellationToken;

use self::{
    dispatcher::{Dispatcher, DispatcherConfig},
    kubernetes::{KubeClusterObjects, KubeSecretStore},
    reconciler::{cluster::Reconciler, context::ReconcilerContext},
    registry::ClusterRegistry,
    watch::run_event_source,
};

pub mod dispatcher;
pub mod kubernetes;
pub mod reconciler;
pub mod registry;
pub mod watch;

pub const CONTROLLER_FIELD_MANAGER: &str = "pgkeeper-controller";

pub async fn main_controller(client: Client, config: OperatorConfig) {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let registry = ClusterRegistry::new();

    let context = ReconcilerContext {
        objects: Arc::new(KubeClusterObjects::new(client.clone())),
        secrets: Arc::new(KubeSecretStore::new(client.clone(), config.event_timeout)),
        config: config.clone(),
    };
    let reconciler = Arc::new(Reconciler::new(Arc::new(context)));

    let (dispatcher, pool) = Dispatcher::start(
        DispatcherConfig::from(config.as_ref()),
        reconciler,
        registry.clone(),
        shutdown.clone(),
    );
    let dispatcher = Arc::new(dispatcher);

    let event_source = tokio::spawn(run_event_source(
        client,
        config.clone(),
        dispatcher.clone(),
        shutdown.clone(),
    ));

    wait_for_shutdown_signal().await;
    info!("Shutting down...");
    shutdown.cancel();

    if let Err(error) = event_source.await {
        error!("Event source failed to stop cleanly! {error}");
    }
    drop(dispatcher);

    let reports = pool.join().await;
    let handled = reports.iter().map(|report| report.handled).sum::<u64>();
    let discarded = reports.iter().map(|report| report.discarded).sum::<u64>();

    info!(
        "Stopped {} workers ({handled} events handled, {discarded} discarded, {} clusters known)",
        reports.len(),
        registry.len().await
    );
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            error!("Couldn't listen for SIGTERM! {error}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
