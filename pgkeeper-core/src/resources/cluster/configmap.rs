use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;

use crate::resources::{
    annotations::annotate_spec_hash,
    labels::ROLE_LABEL,
    ResourceGenerationError,
};

use super::ClusterRelease;

impl ClusterRelease {
    pub fn get_configmap_name(&self) -> String {
        format!("{}-config", self.cluster_name())
    }

    /// Environment consumed by the Spilo container.
    pub fn generate_configmap(&self) -> Result<ConfigMap, ResourceGenerationError> {
        let spilo_configuration = json!({
            "postgresql": {
                "parameters": self.spec.parameters,
            }
        });

        let data = BTreeMap::from([
            ("SCOPE".to_owned(), self.cluster_name().to_owned()),
            ("PGVERSION".to_owned(), self.spec.postgres_version().to_owned()),
            ("PGROOT".to_owned(), "/home/postgres/pgdata/pgroot".to_owned()),
            ("KUBERNETES_SCOPE_LABEL".to_owned(), self.cluster_name_label.to_owned()),
            ("KUBERNETES_ROLE_LABEL".to_owned(), ROLE_LABEL.to_owned()),
            ("SPILO_CONFIGURATION".to_owned(), spilo_configuration.to_string()),
        ]);

        annotate_spec_hash(ConfigMap {
            metadata: self.generate_cluster_metadata(self.get_configmap_name()),
            data: Some(data),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::{
        annotations::read_spec_hash, cluster::tests::test_release,
    };

    #[test]
    fn configmap_renders_parameters() {
        let configmap = test_release().generate_configmap().unwrap();
        let data = configmap.data.as_ref().unwrap();

        assert_eq!(configmap.metadata.name.as_deref(), Some("testcluster-config"));
        assert_eq!(data["SCOPE"], "testcluster");
        assert_eq!(data["PGVERSION"], "15");
        assert_eq!(
            data["SPILO_CONFIGURATION"],
            r#"{"postgresql":{"parameters":{"max_connections":"200"}}}"#
        );
        assert!(read_spec_hash(&configmap.metadata).is_some());
    }

    #[test]
    fn parameter_change_changes_the_hash() {
        let release = test_release();
        let mut changed = test_release();
        changed
            .spec
            .parameters
            .insert("shared_buffers".to_owned(), "1GB".to_owned());

        let before = release.generate_configmap().unwrap();
        let again = release.generate_configmap().unwrap();
        let after = changed.generate_configmap().unwrap();

        assert_eq!(
            read_spec_hash(&before.metadata),
            read_spec_hash(&again.metadata)
        );
        assert_ne!(
            read_spec_hash(&before.metadata),
            read_spec_hash(&after.metadata)
        );
    }
}
