use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec},
        core::v1::{
            ConfigMap, ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar,
            EnvVarSource, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec,
            PodSpec, PodTemplateSpec, ResourceRequirements, SecretKeySelector, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector},
};
use kube::core::ObjectMeta;

use crate::{
    helpers::RequireMetadata,
    resources::{annotations::annotate_spec_hash, ResourceGenerationError},
    roles::{REPLICATION_USER_NAME, SUPERUSER_NAME},
};

use super::{secret::PASSWORD_KEY, ClusterRelease, POSTGRES_PORT, POSTGRES_PORT_NAME};

pub const PATRONI_PORT: i32 = 8008;
pub const PATRONI_PORT_NAME: &str = "patroni";
pub const DATA_VOLUME_NAME: &str = "pgdata";
pub const DATA_VOLUME_PATH: &str = "/home/postgres/pgdata";
pub const CONTAINER_NAME: &str = "postgres";

impl ClusterRelease {
    pub fn get_statefulset_name(&self) -> String {
        self.cluster_name().to_owned()
    }

    pub fn generate_statefulset(
        &self,
        configmap: &ConfigMap,
    ) -> Result<StatefulSet, ResourceGenerationError> {
        if self.spec.number_of_instances < 0 {
            return Err(ResourceGenerationError::InvalidData(
                format!("numberOfInstances = {}", self.spec.number_of_instances).into(),
            ));
        }
        if self.spec.volume_size.trim().is_empty() {
            return Err(ResourceGenerationError::MissingData("volumeSize".into()));
        }

        let configmap_name = configmap
            .require_name_or(ResourceGenerationError::DependentMissingMetadataName)?
            .to_owned();
        let pod_labels = self
            .generate_cluster_metadata(self.get_statefulset_name())
            .labels;

        let pod_spec = PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_owned(),
                image: Some(self.get_spilo_image()),
                image_pull_policy: Some("IfNotPresent".to_owned()),
                env: Some(self.generate_environment()),
                env_from: Some(vec![EnvFromSource {
                    config_map_ref: Some(ConfigMapEnvSource {
                        name: Some(configmap_name),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![
                    ContainerPort {
                        name: Some(POSTGRES_PORT_NAME.to_owned()),
                        container_port: POSTGRES_PORT,
                        protocol: Some("TCP".to_owned()),
                        ..Default::default()
                    },
                    ContainerPort {
                        name: Some(PATRONI_PORT_NAME.to_owned()),
                        container_port: PATRONI_PORT,
                        protocol: Some("TCP".to_owned()),
                        ..Default::default()
                    },
                ]),
                volume_mounts: Some(vec![VolumeMount {
                    name: DATA_VOLUME_NAME.to_owned(),
                    mount_path: DATA_VOLUME_PATH.to_owned(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            termination_grace_period_seconds: Some(300),
            ..Default::default()
        };

        annotate_spec_hash(StatefulSet {
            metadata: self.generate_cluster_metadata(self.get_statefulset_name()),
            spec: Some(StatefulSetSpec {
                replicas: Some(self.spec.number_of_instances),
                service_name: self.get_master_service_name(),
                selector: LabelSelector {
                    match_expressions: None,
                    match_labels: Some(self.get_cluster_selector()),
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: pod_labels,
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                volume_claim_templates: Some(vec![self.generate_volume_claim_template()]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn generate_environment(&self) -> Vec<EnvVar> {
        let mut env = vec![EnvVar {
            name: "POD_NAMESPACE".to_owned(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.namespace".to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }];

        for (prefix, role) in [("SUPERUSER", SUPERUSER_NAME), ("STANDBY", REPLICATION_USER_NAME)] {
            env.push(EnvVar {
                name: format!("PGUSER_{prefix}"),
                value: Some(role.to_owned()),
                ..Default::default()
            });
            env.push(EnvVar {
                name: format!("PGPASSWORD_{prefix}"),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: Some(self.get_credentials_secret_name(role)),
                        key: PASSWORD_KEY.to_owned(),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        env
    }

    fn generate_volume_claim_template(&self) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_VOLUME_NAME.to_owned()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_owned(),
                        Quantity(self.spec.volume_size.trim().to_owned()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::api::resource::Quantity};

    use crate::resources::{
        annotations::read_spec_hash, cluster::tests::test_release, ResourceGenerationError,
    };

    #[test]
    fn statefulset_runs_spilo_with_requested_instances() {
        let release = test_release();
        let configmap = release.generate_configmap().unwrap();

        let statefulset = release.generate_statefulset(&configmap).unwrap();
        let spec = statefulset.spec.as_ref().unwrap();
        let pod = spec.template.spec.as_ref().unwrap();
        let container = &pod.containers[0];

        assert_eq!(spec.replicas, Some(2));
        assert_eq!(spec.service_name, "testcluster");
        assert_eq!(
            container.image.as_deref(),
            Some("ghcr.io/zalando/spilo-15:3.2-p2")
        );
        assert_eq!(
            container.env_from.as_ref().unwrap()[0]
                .config_map_ref
                .as_ref()
                .unwrap()
                .name
                .as_deref(),
            Some("testcluster-config")
        );
        assert_eq!(
            spec.volume_claim_templates.as_ref().unwrap()[0]
                .spec
                .as_ref()
                .unwrap()
                .resources
                .as_ref()
                .unwrap()
                .requests
                .as_ref()
                .unwrap()["storage"],
            Quantity("10Gi".to_owned())
        );
        assert!(read_spec_hash(&statefulset.metadata).is_some());
    }

    #[test]
    fn superuser_password_comes_from_its_secret() {
        let release = test_release();
        let statefulset = release
            .generate_statefulset(&release.generate_configmap().unwrap())
            .unwrap();
        let env = statefulset.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        let password = env
            .iter()
            .find(|var| var.name == "PGPASSWORD_SUPERUSER")
            .unwrap();
        let secret_ref = password
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();

        assert_eq!(
            secret_ref.name.as_deref(),
            Some("postgres.testcluster.credentials")
        );
        assert_eq!(secret_ref.key, "password");
    }

    #[test]
    fn scaling_changes_only_the_statefulset_hash() {
        let release = test_release();
        let mut scaled = test_release();
        scaled.spec.number_of_instances = 3;

        let configmap = release.generate_configmap().unwrap();
        let before = release.generate_statefulset(&configmap).unwrap();
        let after = scaled
            .generate_statefulset(&scaled.generate_configmap().unwrap())
            .unwrap();

        assert_ne!(
            read_spec_hash(&before.metadata),
            read_spec_hash(&after.metadata)
        );
        assert_eq!(
            read_spec_hash(&configmap.metadata),
            read_spec_hash(&scaled.generate_configmap().unwrap().metadata)
        );
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        let mut release = test_release();
        let configmap = release.generate_configmap().unwrap();

        release.spec.number_of_instances = -1;
        assert!(matches!(
            release.generate_statefulset(&configmap),
            Err(ResourceGenerationError::InvalidData(_))
        ));

        release.spec.number_of_instances = 1;
        release.spec.volume_size = " ".to_owned();
        assert!(matches!(
            release.generate_statefulset(&configmap),
            Err(ResourceGenerationError::MissingData(_))
        ));

        release.spec.volume_size = "1Gi".to_owned();
        assert!(matches!(
            release.generate_statefulset(&ConfigMap::default()),
            Err(ResourceGenerationError::DependentMissingMetadataName)
        ));
    }
}
