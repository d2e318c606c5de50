use pgkeeper_core::resources::crd::v1alpha1::postgresql::PostgresqlSpec;

/// Object groups that need converging after a spec change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecDelta {
    /// credential secrets and the infrastructure roles secret
    pub credentials: bool,
    /// the StatefulSet's replicas and volumes
    pub scaling: bool,
    /// the ConfigMap and the StatefulSet's image
    pub configuration: bool,
    pub services: bool,
}

impl SpecDelta {
    pub fn everything() -> Self {
        Self {
            credentials: true,
            scaling: true,
            configuration: true,
            services: true,
        }
    }

    /// Without a previously applied spec nothing can be assumed in place.
    pub fn between(previous: Option<&PostgresqlSpec>, next: &PostgresqlSpec) -> Self {
        let Some(previous) = previous else {
            return Self::everything();
        };

        // the team is a label on every object
        if previous.team_id != next.team_id {
            return Self::everything();
        }

        Self {
            credentials: previous.users != next.users,
            scaling: previous.number_of_instances != next.number_of_instances
                || previous.volume_size != next.volume_size,
            configuration: previous.parameters != next.parameters
                || previous.postgres_version() != next.postgres_version(),
            services: previous.enable_replica_service != next.enable_replica_service,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn touches_statefulset(&self) -> bool {
        self.scaling || self.configuration
    }
}
