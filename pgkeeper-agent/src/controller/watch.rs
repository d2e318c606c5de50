use std::{collections::HashMap, pin::pin, sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::watcher::{self, watcher, Config},
    Api, Client, Resource,
};
use log::{debug, error, info, warn};
use pgkeeper_core::{
    cluster::{event::ClusterEvent, pod_cluster_identity, ClusterIdentity},
    config::OperatorConfig,
    resources::crd::v1alpha1::postgresql::{Postgresql, PostgresqlSpec},
};
use tokio::{
    select,
    time::{interval, sleep, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::dispatcher::Dispatcher;

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

struct KnownCluster {
    generation: Option<i64>,
    spec: PostgresqlSpec,
}

/// Turns watch notifications into cluster events, remembering the last seen
/// generation of every cluster so unchanged objects produce nothing.
pub struct EventTranslator {
    cluster_name_label: String,
    known: HashMap<ClusterIdentity, KnownCluster>,
}

impl EventTranslator {
    pub fn new(cluster_name_label: impl Into<String>) -> Self {
        Self {
            cluster_name_label: cluster_name_label.into(),
            known: HashMap::new(),
        }
    }

    pub fn translate(&mut self, event: watcher::Event<Postgresql>) -> Vec<ClusterEvent> {
        match event {
            watcher::Event::Applied(object) => self.applied(object).into_iter().collect(),
            watcher::Event::Deleted(object) => self.deleted(&object).into_iter().collect(),
            watcher::Event::Restarted(objects) => self.restarted(objects),
        }
    }

    fn applied(&mut self, object: Postgresql) -> Option<ClusterEvent> {
        let Some(identity) = ClusterIdentity::from_resource(&object) else {
            warn!("Ignoring a Postgresql resource without a name or namespace!");
            return None;
        };
        let generation = object.meta().generation;
        let spec = object.spec;

        let event = match self.known.get(&identity) {
            None => ClusterEvent::add(identity.clone(), spec.clone()),
            Some(known) => {
                let changed = match (known.generation, generation) {
                    (Some(previous), Some(current)) => previous != current,
                    _ => known.spec != spec,
                };

                if !changed {
                    debug!("'{identity}' didn't change");
                    return None;
                }

                ClusterEvent::update(identity.clone(), spec.clone())
            }
        };

        self.known.insert(identity, KnownCluster { generation, spec });

        Some(event)
    }

    fn deleted(&mut self, object: &Postgresql) -> Option<ClusterEvent> {
        let identity = ClusterIdentity::from_resource(object)?;
        self.known.remove(&identity);

        Some(ClusterEvent::delete(identity))
    }

    /// A relist replaces everything known, clusters missing from it were deleted
    /// while the watch was down.
    fn restarted(&mut self, objects: Vec<Postgresql>) -> Vec<ClusterEvent> {
        let listed = objects
            .iter()
            .filter_map(ClusterIdentity::from_resource)
            .collect::<Vec<_>>();

        let mut gone = self
            .known
            .keys()
            .filter(|identity| !listed.contains(identity))
            .cloned()
            .collect::<Vec<_>>();
        gone.sort();

        let mut events = objects
            .into_iter()
            .filter_map(|object| self.applied(object))
            .collect::<Vec<_>>();

        for identity in gone {
            self.known.remove(&identity);
            events.push(ClusterEvent::delete(identity));
        }

        events
    }

    /// A sync for every known cluster, in a stable order.
    pub fn resync(&self) -> Vec<ClusterEvent> {
        let mut identities = self.known.keys().collect::<Vec<_>>();
        identities.sort();

        identities
            .into_iter()
            .map(|identity| {
                ClusterEvent::sync(
                    identity.clone(),
                    self.known.get(identity).map(|known| known.spec.clone()),
                )
            })
            .collect()
    }

    /// Pod changes ask their cluster to check for drift.
    pub fn translate_pod(&self, pod: &Pod) -> Option<ClusterEvent> {
        let identity = pod_cluster_identity(pod, &self.cluster_name_label)?;
        let known = self.known.get(&identity)?;

        Some(ClusterEvent::sync(identity, Some(known.spec.clone())))
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }
}

fn scoped_api<K>(client: &Client, config: &OperatorConfig) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match &config.watched_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Feeds the dispatcher from the Postgresql and pod watches plus the periodic
/// resync, until shutdown is requested.
pub async fn run_event_source(
    client: Client,
    config: Arc<OperatorConfig>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    info!("Starting cluster watches...");

    let clusters_api = scoped_api::<Postgresql>(&client, &config);
    let pods_api = scoped_api::<Pod>(&client, &config);
    let mut clusters = pin!(watcher(clusters_api, Config::default()));
    let mut pods = pin!(watcher(
        pods_api,
        Config::default().labels(&config.cluster_name_label)
    ));

    let mut resync = interval(config.resync_period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the initial list already covers the first tick
    resync.tick().await;

    let mut translator = EventTranslator::new(config.cluster_name_label.to_owned());

    loop {
        let events = select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = clusters.next() => match event {
                Some(Ok(event)) => translator.translate(event),
                Some(Err(error)) => {
                    warn!("Postgresql watch failed! {error}");
                    if !wait_before_retry(&shutdown).await {
                        break;
                    }
                    continue;
                }
                None => break,
            },
            event = pods.next() => match event {
                Some(Ok(watcher::Event::Applied(pod) | watcher::Event::Deleted(pod))) => {
                    translator.translate_pod(&pod).into_iter().collect()
                }
                Some(Ok(watcher::Event::Restarted(_))) => continue,
                Some(Err(error)) => {
                    warn!("Pod watch failed! {error}");
                    if !wait_before_retry(&shutdown).await {
                        break;
                    }
                    continue;
                }
                None => break,
            },
            _ = resync.tick() => {
                info!("Resynchronizing {} clusters...", translator.len());
                translator.resync()
            }
        };

        for event in events {
            select! {
                biased;
                _ = shutdown.cancelled() => return,
                result = dispatcher.dispatch(event) => {
                    if let Err(error) = result {
                        error!("{error}");
                        return;
                    }
                }
            }
        }
    }

    info!("Cluster watches stopped");
}

/// Delays the next poll of a failed watch, returns `false` on shutdown.
async fn wait_before_retry(shutdown: &CancellationToken) -> bool {
    select! {
        _ = shutdown.cancelled() => false,
        _ = sleep(WATCH_RETRY_DELAY) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Pod;
    use kube::{core::ObjectMeta, runtime::watcher};
    use pgkeeper_core::{
        cluster::{
            event::{ClusterEvent, EventKind},
            ClusterIdentity,
        },
        resources::crd::v1alpha1::postgresql::{Postgresql, PostgresqlSpec},
    };

    use tokio_util::sync::CancellationToken;

    use super::{wait_before_retry, EventTranslator};

    fn postgresql(name: &str, generation: i64, instances: i32) -> Postgresql {
        Postgresql {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: PostgresqlSpec {
                number_of_instances: instances,
                ..Default::default()
            },
            status: None,
        }
    }

    fn kinds(events: &[ClusterEvent]) -> Vec<(&str, &str)> {
        events
            .iter()
            .map(|event| (event.identity().name(), event.kind().name()))
            .collect()
    }

    #[test]
    fn generations_drive_add_and_update() {
        let mut translator = EventTranslator::new("cluster-name");

        let first = translator.translate(watcher::Event::Applied(postgresql("pg", 1, 1)));
        let same = translator.translate(watcher::Event::Applied(postgresql("pg", 1, 1)));
        let newer = translator.translate(watcher::Event::Applied(postgresql("pg", 2, 3)));

        assert_eq!(kinds(&first), vec![("pg", "add")]);
        assert!(same.is_empty());
        assert_eq!(kinds(&newer), vec![("pg", "update")]);
        assert_eq!(newer[0].kind().spec().unwrap().number_of_instances, 3);
    }

    #[test]
    fn deletion_forgets_the_cluster() {
        let mut translator = EventTranslator::new("cluster-name");
        translator.translate(watcher::Event::Applied(postgresql("pg", 1, 1)));

        let deleted = translator.translate(watcher::Event::Deleted(postgresql("pg", 1, 1)));

        assert_eq!(
            deleted,
            vec![ClusterEvent::delete(ClusterIdentity::new("default", "pg"))]
        );
        assert!(translator.resync().is_empty());
    }

    #[test]
    fn relist_reports_changes_and_vanished_clusters() {
        let mut translator = EventTranslator::new("cluster-name");
        translator.translate(watcher::Event::Applied(postgresql("kept", 1, 1)));
        translator.translate(watcher::Event::Applied(postgresql("changed", 1, 1)));
        translator.translate(watcher::Event::Applied(postgresql("gone", 1, 1)));

        let events = translator.translate(watcher::Event::Restarted(vec![
            postgresql("kept", 1, 1),
            postgresql("changed", 2, 2),
            postgresql("new", 1, 1),
        ]));

        assert_eq!(
            kinds(&events),
            vec![("changed", "update"), ("new", "add"), ("gone", "delete")]
        );
        assert_eq!(translator.len(), 3);
    }

    #[test]
    fn resync_covers_every_known_cluster_with_its_spec() {
        let mut translator = EventTranslator::new("cluster-name");
        translator.translate(watcher::Event::Applied(postgresql("b", 1, 2)));
        translator.translate(watcher::Event::Applied(postgresql("a", 1, 1)));

        let events = translator.resync();

        assert_eq!(kinds(&events), vec![("a", "sync"), ("b", "sync")]);
        assert!(matches!(
            events[1].kind(),
            EventKind::Sync(Some(spec)) if spec.number_of_instances == 2
        ));
    }

    #[test]
    fn pods_of_known_clusters_trigger_a_sync() {
        let mut translator = EventTranslator::new("cluster-name");
        translator.translate(watcher::Event::Applied(postgresql("pg", 1, 1)));
        let pod = |cluster: &str| Pod {
            metadata: ObjectMeta {
                name: Some(format!("{cluster}-0")),
                namespace: Some("default".to_owned()),
                labels: Some(BTreeMap::from([(
                    "cluster-name".to_owned(),
                    cluster.to_owned(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        let event = translator.translate_pod(&pod("pg")).unwrap();

        assert_eq!(event.identity(), &ClusterIdentity::new("default", "pg"));
        assert_eq!(event.kind().name(), "sync");
        assert_eq!(translator.translate_pod(&pod("unknown")), None);
        assert_eq!(translator.translate_pod(&Pod::default()), None);
    }

    #[tokio::test]
    async fn shutdown_cuts_the_retry_delay_short() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert!(!wait_before_retry(&shutdown).await);
    }
}
