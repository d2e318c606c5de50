use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use pgkeeper_core::{
    cluster::{
        event::{ClusterEvent, EventKind},
        state::{ClusterState, ClusterStatus},
        ClusterIdentity,
    },
    resources::{
        cluster::{
            secret::{generate_password, secret_password},
            ClusterRelease, ClusterReleaseBuilder,
        },
        crd::v1alpha1::postgresql::{PostgresqlSpec, PostgresqlStatus},
        labels::get_cluster_labels,
        object::{ManagedObject, ObjectKind},
    },
    roles::{
        credential_roles,
        infrastructure::{resolve_infrastructure_roles, RoleError},
        store::SecretStoreError,
    },
};
use tokio::time::timeout;

use crate::controller::{dispatcher::EventHandler, registry::RegistryWriter};

use super::{context::ReconcilerContext, delta::SpecDelta, error::ReconcilerError};

/// Drives every cluster event through the cluster state machine.
pub struct Reconciler {
    context: Arc<ReconcilerContext>,
}

#[async_trait]
impl EventHandler for Reconciler {
    async fn handle(&self, event: ClusterEvent, registry: &RegistryWriter) {
        let identity = event.identity().clone();

        if let Err(error) = self.reconcile(event, registry).await {
            error!("Couldn't reconcile '{identity}'! {error}");
        }
    }

    async fn on_panic(&self, identity: &ClusterIdentity, registry: &RegistryWriter) {
        if let Some(state) = registry.get(identity).await {
            self.report_status(&state).await;
        }
    }
}

impl Reconciler {
    pub fn new(context: Arc<ReconcilerContext>) -> Self {
        Self { context }
    }

    /// Applies one event to its cluster.
    ///
    /// Convergence failures are recorded in the registry and don't surface
    /// here, an error means the registry itself couldn't be updated.
    pub async fn reconcile(
        &self,
        event: ClusterEvent,
        registry: &RegistryWriter,
    ) -> Result<(), ReconcilerError> {
        let (sequence, identity, kind) = event.into_parts();
        let previous = registry.get(&identity).await;
        let status_before = previous.as_ref().map(|state| state.status);

        debug!("Reconciling #{sequence} {} for '{identity}'", kind.name());

        let outcome = match kind {
            EventKind::Add(spec) => {
                let mut state = ClusterState::new(identity, registry.worker());
                // a repeated add must not lose the last good snapshot
                state.last_applied = previous.and_then(|previous| previous.last_applied);
                registry.put(state.clone()).await?;

                self.sync_cluster(state, spec, SpecDelta::everything(), registry)
                    .await?
            }
            EventKind::Update(spec) => {
                let state = previous
                    .unwrap_or_else(|| ClusterState::new(identity, registry.worker()));
                // a failed cluster may be anywhere between two specs
                let delta = match state.status {
                    ClusterStatus::Failed => SpecDelta::everything(),
                    _ => SpecDelta::between(state.last_applied.as_ref(), &spec),
                };

                self.sync_cluster(state, spec, delta, registry).await?
            }
            EventKind::Sync(spec) => {
                let target = match (previous, spec) {
                    (Some(state), Some(spec)) => Some((state, spec)),
                    (Some(state), None) => state
                        .last_applied
                        .clone()
                        .map(|spec| (state, spec)),
                    (None, Some(spec)) => {
                        Some((ClusterState::new(identity.clone(), registry.worker()), spec))
                    }
                    (None, None) => None,
                };

                let Some((state, spec)) = target else {
                    debug!("Nothing to synchronize for '{identity}'");
                    return Ok(());
                };

                self.sync_cluster(state, spec, SpecDelta::everything(), registry)
                    .await?
            }
            EventKind::Delete => self.delete_cluster(identity, previous, registry).await?,
        };

        if let Some(state) = outcome {
            if status_before != Some(state.status) {
                self.report_status(&state).await;
            }
        }

        Ok(())
    }

    async fn sync_cluster(
        &self,
        mut state: ClusterState,
        spec: PostgresqlSpec,
        delta: SpecDelta,
        registry: &RegistryWriter,
    ) -> Result<Option<ClusterState>, ReconcilerError> {
        state.status = ClusterStatus::Syncing;
        registry.put(state.clone()).await?;

        let event_timeout = self.context.config.event_timeout;
        let convergence = timeout(event_timeout, self.converge(&state.identity, &spec, delta))
            .await
            .unwrap_or(Err(ReconcilerError::Timeout(event_timeout)));

        match convergence {
            Ok(role_errors) => {
                info!("Cluster '{}' is running", state.identity);

                state.status = ClusterStatus::Running;
                state.last_applied = Some(spec);
                state.last_error = None;
                if let Some(role_errors) = role_errors {
                    state.role_errors = role_errors;
                }
            }
            Err(error) => {
                warn!("Cluster '{}' failed to converge! {error}", state.identity);

                state.status = ClusterStatus::Failed;
                state.last_error = Some(error.to_string());
            }
        }

        registry.put(state.clone()).await?;

        Ok(Some(state))
    }

    /// Returns the infrastructure role errors when credentials were converged.
    async fn converge(
        &self,
        identity: &ClusterIdentity,
        spec: &PostgresqlSpec,
        delta: SpecDelta,
    ) -> Result<Option<Vec<String>>, ReconcilerError> {
        if delta.is_empty() {
            debug!("'{identity}' has no changes to apply");
            return Ok(None);
        }

        let release = ClusterReleaseBuilder::default()
            .with_config(&self.context.config)
            .identity(identity.clone())
            .spec(spec.clone())
            .build()
            .map_err(ReconcilerError::ClusterReleaseBuilderError)?;

        let role_errors = match delta.credentials {
            true => Some(self.ensure_credentials(&release).await?),
            false => None,
        };

        let configmap = release.generate_configmap()?;
        if delta.configuration {
            self.ensure_object(configmap.clone().into()).await?;
        }

        if delta.services {
            self.ensure_object(release.generate_master_service()?.into())
                .await?;

            match release.generate_replica_service()? {
                Some(service) => self.ensure_object(service.into()).await?,
                None => {
                    self.remove_object(
                        ObjectKind::Service,
                        release.namespace(),
                        &release.get_replica_service_name(),
                    )
                    .await?
                }
            }
        }

        if delta.touches_statefulset() {
            self.ensure_object(release.generate_statefulset(&configmap)?.into())
                .await?;
        }

        Ok(role_errors)
    }

    async fn ensure_credentials(
        &self,
        release: &ClusterRelease,
    ) -> Result<Vec<String>, ReconcilerError> {
        let mut expected = Vec::new();

        for user in credential_roles(&release.spec) {
            let name = release.get_credentials_secret_name(&user.name);
            let current = self
                .context
                .objects
                .get(ObjectKind::Secret, release.namespace(), &name)
                .await?;
            let password = current
                .as_ref()
                .and_then(ManagedObject::as_secret)
                .and_then(secret_password)
                .unwrap_or_else(generate_password);
            let secret = release.generate_credentials_secret(&user, &password)?;

            self.apply_if_changed(secret.into(), current.as_ref())
                .await?;
            expected.push(name);
        }

        let role_specs = &self.context.config.infrastructure_roles;
        let mut role_errors = Vec::new();

        if !role_specs.is_empty() {
            let (roles, errors) =
                resolve_infrastructure_roles(self.context.secrets.as_ref(), role_specs).await;

            // an unreadable secret must not shrink the provisioned roles
            if let Some(error) = errors.iter().find(|error| error.is_transient()) {
                return Err(match error {
                    RoleError::SecretFetch {
                        source: SecretStoreError::Timeout,
                        ..
                    } => ReconcilerError::Timeout(self.context.config.event_timeout),
                    _ => ReconcilerError::InfrastructureRolesUnavailable(error.clone()),
                });
            }

            for error in &errors {
                warn!("Infrastructure roles of '{}': {error}", release.identity);
            }

            self.ensure_object(release.generate_infrastructure_roles_secret(&roles)?.into())
                .await?;
            expected.push(release.get_infrastructure_roles_secret_name());
            role_errors = errors.iter().map(ToString::to_string).collect();
        }

        self.remove_stale_secrets(release, &expected).await?;

        Ok(role_errors)
    }

    /// Removes the cluster's secrets that no longer belong to any role.
    async fn remove_stale_secrets(
        &self,
        release: &ClusterRelease,
        expected: &[String],
    ) -> Result<(), ReconcilerError> {
        let names = self
            .context
            .objects
            .list_names(
                ObjectKind::Secret,
                release.namespace(),
                &release.get_cluster_selector(),
            )
            .await?;

        for name in names.into_iter().filter(|name| !expected.contains(name)) {
            info!("Removing stale Secret '{name}' of '{}'...", release.identity);
            self.context
                .objects
                .delete(ObjectKind::Secret, release.namespace(), &name)
                .await?;
        }

        Ok(())
    }

    async fn ensure_object(&self, desired: ManagedObject) -> Result<(), ReconcilerError> {
        let namespace = desired
            .namespace()
            .ok_or(ReconcilerError::MissingObjectMetadata)?;
        let name = desired.name().ok_or(ReconcilerError::MissingObjectMetadata)?;
        let current = self
            .context
            .objects
            .get(desired.kind(), namespace, name)
            .await?;

        self.apply_if_changed(desired, current.as_ref()).await
    }

    async fn apply_if_changed(
        &self,
        desired: ManagedObject,
        current: Option<&ManagedObject>,
    ) -> Result<(), ReconcilerError> {
        let up_to_date = match (current.and_then(ManagedObject::spec_hash), desired.spec_hash()) {
            (Some(current), Some(desired)) => current == desired,
            _ => false,
        };

        if up_to_date {
            debug!(
                "{} '{}' is up to date",
                desired.kind(),
                desired.name().unwrap_or_default()
            );
            return Ok(());
        }

        info!(
            "Applying {} '{}'...",
            desired.kind(),
            desired.name().unwrap_or_default()
        );
        self.context.objects.apply(&desired).await
    }

    async fn remove_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ReconcilerError> {
        if self.context.objects.get(kind, namespace, name).await?.is_none() {
            return Ok(());
        }

        info!("Removing {kind} '{name}'...");
        self.context.objects.delete(kind, namespace, name).await
    }

    async fn delete_cluster(
        &self,
        identity: ClusterIdentity,
        previous: Option<ClusterState>,
        registry: &RegistryWriter,
    ) -> Result<Option<ClusterState>, ReconcilerError> {
        let known = previous.is_some();
        let mut state =
            previous.unwrap_or_else(|| ClusterState::new(identity.clone(), registry.worker()));
        state.status = ClusterStatus::Deleting;

        if known {
            registry.put(state.clone()).await?;
        }

        let event_timeout = self.context.config.event_timeout;
        let teardown = timeout(event_timeout, self.teardown(&identity))
            .await
            .unwrap_or(Err(ReconcilerError::Timeout(event_timeout)));

        match teardown {
            Ok(()) => {
                registry.remove(&identity).await?;
                info!("Cluster '{identity}' was removed");

                Ok(None)
            }
            Err(error) => {
                warn!("Couldn't remove cluster '{identity}'! {error}");

                state.last_error = Some(error.to_string());
                registry.put(state.clone()).await?;

                Ok(Some(state))
            }
        }
    }

    async fn teardown(&self, identity: &ClusterIdentity) -> Result<(), ReconcilerError> {
        let labels = get_cluster_labels(&self.context.config.cluster_name_label, identity.name());

        for kind in ObjectKind::TEARDOWN_ORDER {
            let names = self
                .context
                .objects
                .list_names(kind, identity.namespace(), &labels)
                .await?;

            for name in names {
                info!("Removing {kind} '{name}' of '{identity}'...");
                self.context
                    .objects
                    .delete(kind, identity.namespace(), &name)
                    .await?;
            }
        }

        Ok(())
    }

    async fn report_status(&self, state: &ClusterState) {
        let status = PostgresqlStatus {
            state: state.status.into(),
            error: state.last_error.to_owned(),
        };

        if let Err(error) = self
            .context
            .objects
            .patch_status(&state.identity, &status)
            .await
        {
            warn!("Couldn't update the status of '{}'! {error}", state.identity);
        }
    }
}
