use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};

use crate::resources::{
    annotations::annotate_spec_hash,
    labels::{get_role_selector, MASTER_ROLE, REPLICA_ROLE},
    ResourceGenerationError,
};

use super::{ClusterRelease, POSTGRES_PORT, POSTGRES_PORT_NAME};

impl ClusterRelease {
    pub fn get_master_service_name(&self) -> String {
        self.cluster_name().to_owned()
    }

    pub fn get_replica_service_name(&self) -> String {
        format!("{}-repl", self.cluster_name())
    }

    pub fn generate_master_service(&self) -> Result<Service, ResourceGenerationError> {
        self.generate_role_service(self.get_master_service_name(), MASTER_ROLE)
    }

    /// `None` when the manifest doesn't ask for a replica service.
    pub fn generate_replica_service(&self) -> Result<Option<Service>, ResourceGenerationError> {
        if !self.spec.enable_replica_service {
            return Ok(None);
        }

        self.generate_role_service(self.get_replica_service_name(), REPLICA_ROLE)
            .map(Some)
    }

    fn generate_role_service(
        &self,
        name: String,
        role: &str,
    ) -> Result<Service, ResourceGenerationError> {
        let selector = get_role_selector(&self.cluster_name_label, self.cluster_name(), role);

        annotate_spec_hash(Service {
            metadata: self.generate_cluster_metadata(name),
            spec: Some(ServiceSpec {
                selector: Some(selector),
                type_: Some("ClusterIP".to_owned()),
                ports: Some(vec![ServicePort {
                    name: Some(POSTGRES_PORT_NAME.to_owned()),
                    port: POSTGRES_PORT,
                    protocol: Some("TCP".to_owned()),
                    target_port: Some(IntOrString::Int(POSTGRES_PORT)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::cluster::tests::test_release;

    #[test]
    fn master_service_selects_the_master_pod() {
        let service = test_release().generate_master_service().unwrap();
        let spec = service.spec.unwrap();
        let selector = spec.selector.unwrap();

        assert_eq!(service.metadata.name.as_deref(), Some("testcluster"));
        assert_eq!(selector["spilo-role"], "master");
        assert_eq!(selector["cluster-name"], "testcluster");
        assert_eq!(spec.ports.unwrap()[0].port, 5432);
    }

    #[test]
    fn replica_service_follows_the_manifest() {
        let mut release = test_release();

        let service = release.generate_replica_service().unwrap().unwrap();
        assert_eq!(service.metadata.name.as_deref(), Some("testcluster-repl"));
        assert_eq!(
            service.spec.unwrap().selector.unwrap()["spilo-role"],
            "replica"
        );

        release.spec.enable_replica_service = false;
        assert!(release.generate_replica_service().unwrap().is_none());
    }
}
