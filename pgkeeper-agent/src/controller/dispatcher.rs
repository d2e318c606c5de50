use std::{
    any::Any,
    num::{NonZeroU32, NonZeroUsize},
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use pgkeeper_core::{
    cluster::{event::ClusterEvent, ClusterIdentity},
    config::OperatorConfig,
    sharding::{worker_id, WorkerId},
};
use thiserror::Error;
use tokio::{
    select,
    sync::mpsc::{channel, Receiver, Sender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::registry::{ClusterRegistry, RegistryWriter};

/// Processes the events of the clusters owned by one worker.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ClusterEvent, registry: &RegistryWriter);

    /// Called once the cluster was marked failed after `handle` panicked.
    async fn on_panic(&self, _identity: &ClusterIdentity, _registry: &RegistryWriter) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub workers: NonZeroU32,
    pub queue_capacity: NonZeroUsize,
}

impl From<&OperatorConfig> for DispatcherConfig {
    fn from(value: &OperatorConfig) -> Self {
        Self {
            workers: value.workers,
            queue_capacity: value.queue_capacity,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Worker {worker} has stopped, event for '{identity}' was not accepted!")]
    WorkerStopped {
        worker: WorkerId,
        identity: ClusterIdentity,
    },
}

/// Routes cluster events to the worker owning the cluster.
pub struct Dispatcher {
    lanes: Vec<Sender<ClusterEvent>>,
    workers: NonZeroU32,
    sequence: AtomicU64,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerReport>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub handled: u64,
    /// events still queued when the worker was told to stop
    pub discarded: u64,
}

impl Dispatcher {
    pub fn start(
        config: DispatcherConfig,
        handler: Arc<dyn EventHandler>,
        registry: Arc<ClusterRegistry>,
        shutdown: CancellationToken,
    ) -> (Self, WorkerPool) {
        info!(
            "Starting {} workers with {} queued events each...",
            config.workers, config.queue_capacity
        );

        let mut lanes = Vec::new();
        let mut handles = Vec::new();

        for worker in 0..config.workers.get() {
            let (sender, receiver) = channel(config.queue_capacity.get());
            let writer = RegistryWriter::new(registry.clone(), worker, config.workers);

            handles.push(tokio::spawn(run_worker(
                worker,
                receiver,
                handler.clone(),
                writer,
                shutdown.clone(),
            )));
            lanes.push(sender);
        }

        let dispatcher = Self {
            lanes,
            workers: config.workers,
            sequence: AtomicU64::new(0),
        };

        (dispatcher, WorkerPool { handles })
    }

    pub fn worker_for(&self, identity: &ClusterIdentity) -> WorkerId {
        worker_id(identity, self.workers)
    }

    /// Queues the event on its cluster's lane, waiting while the lane is full.
    ///
    /// Returns the sequence number stamped on the event.
    pub async fn dispatch(&self, event: ClusterEvent) -> Result<u64, DispatchError> {
        let worker = self.worker_for(event.identity());
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = event.with_sequence(sequence);

        debug!(
            "Dispatching #{sequence} {} for '{}' to worker {worker}",
            event.kind().name(),
            event.identity()
        );

        self.lanes[worker as usize]
            .send(event)
            .await
            .map_err(|rejected| DispatchError::WorkerStopped {
                worker,
                identity: rejected.0.identity().clone(),
            })?;

        Ok(sequence)
    }
}

impl WorkerPool {
    /// Waits until every worker exits, after shutdown or once the dispatcher is dropped.
    pub async fn join(self) -> Vec<WorkerReport> {
        let mut reports = Vec::new();

        for handle in self.handles {
            match handle.await {
                Ok(report) => {
                    debug!("Worker {} joined", report.worker);
                    reports.push(report)
                }
                Err(error) => error!("Worker task failed to complete! {error}"),
            }
        }

        reports
    }
}

async fn run_worker(
    worker: WorkerId,
    mut lane: Receiver<ClusterEvent>,
    handler: Arc<dyn EventHandler>,
    writer: RegistryWriter,
    shutdown: CancellationToken,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };

    loop {
        let event = select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = lane.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        handle_event(worker, event, handler.as_ref(), &writer).await;
        report.handled += 1;
    }

    lane.close();
    while let Ok(event) = lane.try_recv() {
        debug!(
            "Worker {worker} discarding #{} {} for '{}'",
            event.sequence(),
            event.kind().name(),
            event.identity()
        );
        report.discarded += 1;
    }

    if report.discarded > 0 {
        warn!(
            "Worker {worker} stopped with {} unprocessed events!",
            report.discarded
        );
    }
    debug!("Worker {worker} stopped after {} events", report.handled);

    report
}

async fn handle_event(
    worker: WorkerId,
    event: ClusterEvent,
    handler: &dyn EventHandler,
    writer: &RegistryWriter,
) {
    let identity = event.identity().clone();

    info!(
        "Worker {worker} handling #{} {} for '{identity}'",
        event.sequence(),
        event.kind().name()
    );

    let outcome = AssertUnwindSafe(handler.handle(event, writer))
        .catch_unwind()
        .await;

    if let Err(panic) = outcome {
        let message = panic_message(panic.as_ref());
        error!("Handler panicked while processing '{identity}'! {message}");

        if let Err(error) = writer
            .mark_failed(&identity, format!("Event handler panicked: {message}"))
            .await
        {
            error!("Couldn't record the failure of '{identity}'! {error}");
            return;
        }

        let reported = AssertUnwindSafe(handler.on_panic(&identity, writer))
            .catch_unwind()
            .await;
        if reported.is_err() {
            error!("Couldn't report the failure of '{identity}'!");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_owned();
    }

    panic
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}
