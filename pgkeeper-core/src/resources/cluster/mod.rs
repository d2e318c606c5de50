use std::collections::BTreeMap;

use derive_builder::Builder;
use kube::core::ObjectMeta;

use crate::{
    cluster::ClusterIdentity,
    config::{
        OperatorConfig, DEFAULT_CLUSTER_NAME_LABEL, DEFAULT_SPILO_IMAGE_REPOSITORY,
        DEFAULT_SPILO_IMAGE_TAG,
    },
    resources::crd::v1alpha1::postgresql::PostgresqlSpec,
};

use super::labels::{get_cluster_labels, get_team_cluster_labels};

pub mod configmap;
pub mod secret;
pub mod service;
pub mod statefulset;

pub const POSTGRES_PORT: i32 = 5432;
pub const POSTGRES_PORT_NAME: &str = "postgresql";

/// Everything needed to render the objects of one cluster.
#[derive(Debug, Clone, Builder)]
pub struct ClusterRelease {
    pub identity: ClusterIdentity,
    pub spec: PostgresqlSpec,
    #[builder(setter(into), default = "DEFAULT_CLUSTER_NAME_LABEL.to_owned()")]
    pub cluster_name_label: String,
    #[builder(setter(into), default = "DEFAULT_SPILO_IMAGE_REPOSITORY.to_owned()")]
    pub spilo_image_repository: String,
    #[builder(setter(into), default = "DEFAULT_SPILO_IMAGE_TAG.to_owned()")]
    pub spilo_image_tag: String,
}

impl ClusterReleaseBuilder {
    pub fn with_config(&mut self, config: &OperatorConfig) -> &mut Self {
        self.cluster_name_label(config.cluster_name_label.to_owned())
            .spilo_image_repository(config.spilo_image_repository.to_owned())
            .spilo_image_tag(config.spilo_image_tag.to_owned())
    }
}

impl ClusterRelease {
    pub fn cluster_name(&self) -> &str {
        self.identity.name()
    }

    pub fn namespace(&self) -> &str {
        self.identity.namespace()
    }

    pub fn get_spilo_image(&self) -> String {
        format!(
            "{}-{}:{}",
            self.spilo_image_repository,
            self.spec.postgres_version(),
            self.spilo_image_tag
        )
    }

    pub fn generate_cluster_metadata(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            labels: Some(get_team_cluster_labels(
                &self.cluster_name_label,
                self.cluster_name(),
                &self.spec.team_id,
            )),
            namespace: Some(self.namespace().to_owned()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Selector matching every object and pod of this cluster.
    pub fn get_cluster_selector(&self) -> BTreeMap<String, String> {
        get_cluster_labels(&self.cluster_name_label, self.cluster_name())
    }
}
