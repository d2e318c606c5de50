use std::{
    collections::BTreeMap,
    env::var,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use k8s_openapi::api::core::v1::ConfigMap;
use thiserror::Error;

use crate::{
    cluster::NamespacedName,
    roles::{
        InfrastructureRoleSpec, DEFAULT_PASSWORD_KEY, DEFAULT_ROLE_KEY, DEFAULT_USER_KEY,
    },
};

pub const WORKERS_KEY: &str = "PGKEEPER_WORKERS";
pub const QUEUE_CAPACITY_KEY: &str = "PGKEEPER_QUEUE_CAPACITY";
pub const EVENT_TIMEOUT_KEY: &str = "PGKEEPER_EVENT_TIMEOUT_SECS";
pub const RESYNC_PERIOD_KEY: &str = "PGKEEPER_RESYNC_PERIOD_SECS";
pub const CLUSTER_NAME_LABEL_KEY: &str = "PGKEEPER_CLUSTER_NAME_LABEL";
pub const WATCHED_NAMESPACE_KEY: &str = "PGKEEPER_WATCHED_NAMESPACE";
pub const ENABLE_CRD_REGISTRATION_KEY: &str = "PGKEEPER_ENABLE_CRD_REGISTRATION";
pub const SPILO_IMAGE_REPOSITORY_KEY: &str = "PGKEEPER_SPILO_IMAGE_REPOSITORY";
pub const SPILO_IMAGE_TAG_KEY: &str = "PGKEEPER_SPILO_IMAGE_TAG";
pub const INFRASTRUCTURE_ROLES_SECRET_NAME_KEY: &str =
    "PGKEEPER_INFRASTRUCTURE_ROLES_SECRET_NAME";
pub const INFRASTRUCTURE_ROLES_SECRETS_KEY: &str = "PGKEEPER_INFRASTRUCTURE_ROLES_SECRETS";
/// `namespace/name` of a ConfigMap to read the other keys from instead of the environment
pub const CONFIGMAP_KEY: &str = "PGKEEPER_CONFIGMAP";

pub const DEFAULT_WORKERS: u32 = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CLUSTER_NAME_LABEL: &str = "cluster-name";
pub const DEFAULT_SPILO_IMAGE_REPOSITORY: &str = "ghcr.io/zalando/spilo";
pub const DEFAULT_SPILO_IMAGE_TAG: &str = "3.2-p2";

const ALL_NAMESPACES: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Worker count must be at least 1!")]
    ZeroWorkers,
    #[error("Queue capacity must be at least 1!")]
    ZeroQueueCapacity,
    #[error("Value of {key} couldn't be parsed: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("Infrastructure role definition '{definition}' is malformed: {reason}")]
    MalformedRoleSpec { definition: String, reason: String },
    #[error("ConfigMap data is unset!")]
    MissingData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    pub workers: NonZeroU32,
    /// per worker lane
    pub queue_capacity: NonZeroUsize,
    pub event_timeout: Duration,
    pub resync_period: Duration,
    pub cluster_name_label: String,
    /// `None` watches every namespace
    pub watched_namespace: Option<String>,
    pub enable_crd_registration: bool,
    pub spilo_image_repository: String,
    pub spilo_image_tag: String,
    pub infrastructure_roles: Vec<InfrastructureRoleSpec>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: NonZeroU32::new(DEFAULT_WORKERS).unwrap_or(NonZeroU32::MIN),
            queue_capacity: NonZeroUsize::new(DEFAULT_QUEUE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            resync_period: DEFAULT_RESYNC_PERIOD,
            cluster_name_label: DEFAULT_CLUSTER_NAME_LABEL.to_owned(),
            watched_namespace: None,
            enable_crd_registration: true,
            spilo_image_repository: DEFAULT_SPILO_IMAGE_REPOSITORY.to_owned(),
            spilo_image_tag: DEFAULT_SPILO_IMAGE_TAG.to_owned(),
            infrastructure_roles: Vec::new(),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| var(key).ok())
    }

    pub fn from_configmap(configmap: &ConfigMap) -> Result<Self, ConfigError> {
        let data = configmap.data.as_ref().ok_or(ConfigError::MissingData)?;

        Self::from_data(data)
    }

    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| data.get(key).cloned())
    }

    /// Builds the configuration from a key lookup, unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let workers = match lookup(WORKERS_KEY) {
            Some(value) => {
                NonZeroU32::new(parse_value(WORKERS_KEY, &value)?).ok_or(ConfigError::ZeroWorkers)?
            }
            None => defaults.workers,
        };

        let queue_capacity = match lookup(QUEUE_CAPACITY_KEY) {
            Some(value) => NonZeroUsize::new(parse_value(QUEUE_CAPACITY_KEY, &value)?)
                .ok_or(ConfigError::ZeroQueueCapacity)?,
            None => defaults.queue_capacity,
        };

        let event_timeout = match lookup(EVENT_TIMEOUT_KEY) {
            Some(value) => parse_seconds(EVENT_TIMEOUT_KEY, &value)?,
            None => defaults.event_timeout,
        };

        let resync_period = match lookup(RESYNC_PERIOD_KEY) {
            Some(value) => parse_seconds(RESYNC_PERIOD_KEY, &value)?,
            None => defaults.resync_period,
        };

        let enable_crd_registration = match lookup(ENABLE_CRD_REGISTRATION_KEY) {
            Some(value) => parse_value(ENABLE_CRD_REGISTRATION_KEY, &value)?,
            None => defaults.enable_crd_registration,
        };

        let mut infrastructure_roles = Vec::new();
        if let Some(value) = lookup(INFRASTRUCTURE_ROLES_SECRET_NAME_KEY) {
            let secret = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: INFRASTRUCTURE_ROLES_SECRET_NAME_KEY,
                value: value.to_owned(),
            })?;
            infrastructure_roles.push(InfrastructureRoleSpec::templated(secret));
        }
        if let Some(value) = lookup(INFRASTRUCTURE_ROLES_SECRETS_KEY) {
            infrastructure_roles.extend(parse_infrastructure_roles(&value)?);
        }

        Ok(Self {
            workers,
            queue_capacity,
            event_timeout,
            resync_period,
            cluster_name_label: lookup(CLUSTER_NAME_LABEL_KEY)
                .unwrap_or(defaults.cluster_name_label),
            watched_namespace: lookup(WATCHED_NAMESPACE_KEY)
                .filter(|namespace| namespace != ALL_NAMESPACES),
            enable_crd_registration,
            spilo_image_repository: lookup(SPILO_IMAGE_REPOSITORY_KEY)
                .unwrap_or(defaults.spilo_image_repository),
            spilo_image_tag: lookup(SPILO_IMAGE_TAG_KEY).unwrap_or(defaults.spilo_image_tag),
            infrastructure_roles,
        })
    }
}

/// The ConfigMap the configuration should be read from, if any.
pub fn configmap_reference<F>(lookup: F) -> Result<Option<NamespacedName>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(CONFIGMAP_KEY)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    match value.parse() {
        Ok(reference) => Ok(Some(reference)),
        Err(_) => Err(ConfigError::InvalidValue {
            key: CONFIGMAP_KEY,
            value,
        }),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}

fn parse_seconds(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_value(key, value)? {
        0 => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
        }),
        seconds => Ok(Duration::from_secs(seconds)),
    }
}

/// Parses `secretname:ns/name,userkey:u,passwordkey:p,rolekey:r,template:true`
/// definitions separated by `;`. Only `secretname` is required.
pub fn parse_infrastructure_roles(raw: &str) -> Result<Vec<InfrastructureRoleSpec>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|definition| !definition.is_empty())
        .map(parse_infrastructure_role)
        .collect()
}

fn parse_infrastructure_role(definition: &str) -> Result<InfrastructureRoleSpec, ConfigError> {
    let malformed = |reason: String| ConfigError::MalformedRoleSpec {
        definition: definition.to_owned(),
        reason,
    };

    let mut secret: Option<NamespacedName> = None;
    let mut user_key = DEFAULT_USER_KEY.to_owned();
    let mut password_key = DEFAULT_PASSWORD_KEY.to_owned();
    let mut role_key = DEFAULT_ROLE_KEY.to_owned();
    let mut template = false;

    for pair in definition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| malformed(format!("'{pair}' is not a key:value pair")))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(malformed(format!("'{}' has no value", key.trim())));
        }

        match key.trim() {
            "secretname" => {
                secret = Some(value.parse().map_err(|err| malformed(format!("{err}")))?);
            }
            "userkey" => user_key = value.to_owned(),
            "passwordkey" => password_key = value.to_owned(),
            "rolekey" => role_key = value.to_owned(),
            "template" => {
                template = value
                    .parse()
                    .map_err(|_| malformed(format!("'{value}' is not a boolean")))?;
            }
            other => return Err(malformed(format!("unknown key '{other}'"))),
        }
    }

    let secret = secret.ok_or_else(|| malformed("secretname is missing".to_owned()))?;

    Ok(InfrastructureRoleSpec {
        secret,
        user_key,
        password_key,
        role_key,
        template,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use k8s_openapi::api::core::v1::ConfigMap;

    use crate::{cluster::NamespacedName, roles::InfrastructureRoleSpec};

    use super::{
        configmap_reference, parse_infrastructure_roles, ConfigError, OperatorConfig,
        CONFIGMAP_KEY, EVENT_TIMEOUT_KEY,
        INFRASTRUCTURE_ROLES_SECRETS_KEY, INFRASTRUCTURE_ROLES_SECRET_NAME_KEY, QUEUE_CAPACITY_KEY,
        RESYNC_PERIOD_KEY, WATCHED_NAMESPACE_KEY, WORKERS_KEY,
    };

    fn config_from(pairs: &[(&str, &str)]) -> Result<OperatorConfig, ConfigError> {
        let data = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>();

        OperatorConfig::from_data(&data)
    }

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.workers.get(), 8);
        assert_eq!(config.queue_capacity.get(), 100);
        assert_eq!(config.event_timeout, Duration::from_secs(120));
        assert_eq!(config.cluster_name_label, "cluster-name");
        assert!(config.infrastructure_roles.is_empty());
    }

    #[test]
    fn values_are_parsed() {
        let config = config_from(&[
            (WORKERS_KEY, " 4 "),
            (QUEUE_CAPACITY_KEY, "1"),
            ("PGKEEPER_EVENT_TIMEOUT_SECS", "5"),
            ("PGKEEPER_CLUSTER_NAME_LABEL", "pg-cluster"),
            (WATCHED_NAMESPACE_KEY, "databases"),
            ("PGKEEPER_ENABLE_CRD_REGISTRATION", "false"),
        ])
        .unwrap();

        assert_eq!(config.workers.get(), 4);
        assert_eq!(config.queue_capacity.get(), 1);
        assert_eq!(config.event_timeout, Duration::from_secs(5));
        assert_eq!(config.cluster_name_label, "pg-cluster");
        assert_eq!(config.watched_namespace.as_deref(), Some("databases"));
        assert!(!config.enable_crd_registration);
    }

    #[test]
    fn wildcard_namespace_watches_everything() {
        let config = config_from(&[(WATCHED_NAMESPACE_KEY, "*")]).unwrap();

        assert_eq!(config.watched_namespace, None);
    }

    #[test]
    fn zero_workers_and_capacity_are_rejected() {
        assert_eq!(config_from(&[(WORKERS_KEY, "0")]), Err(ConfigError::ZeroWorkers));
        assert_eq!(
            config_from(&[(QUEUE_CAPACITY_KEY, "0")]),
            Err(ConfigError::ZeroQueueCapacity)
        );
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        assert_eq!(
            config_from(&[(WORKERS_KEY, "many")]),
            Err(ConfigError::InvalidValue {
                key: WORKERS_KEY,
                value: "many".to_owned()
            })
        );
        assert!(config_from(&[(WORKERS_KEY, "-1")]).is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_eq!(
            config_from(&[(RESYNC_PERIOD_KEY, "0")]),
            Err(ConfigError::InvalidValue {
                key: RESYNC_PERIOD_KEY,
                value: "0".to_owned()
            })
        );
        assert!(config_from(&[(EVENT_TIMEOUT_KEY, "0")]).is_err());
    }

    #[test]
    fn configmap_without_data_is_rejected() {
        assert_eq!(
            OperatorConfig::from_configmap(&ConfigMap::default()),
            Err(ConfigError::MissingData)
        );
    }

    #[test]
    fn configmap_reference_is_optional() {
        let lookup = |value: &'static str| {
            move |key: &str| (key == CONFIGMAP_KEY).then(|| value.to_owned())
        };

        assert_eq!(configmap_reference(|_| None), Ok(None));
        assert_eq!(configmap_reference(lookup("  ")), Ok(None));
        assert_eq!(
            configmap_reference(lookup("pgkeeper/operator-config")),
            Ok(Some(NamespacedName::new("pgkeeper", "operator-config")))
        );
        assert_eq!(
            configmap_reference(lookup("operator-config")),
            Ok(Some(NamespacedName::new("default", "operator-config")))
        );
        assert_eq!(
            configmap_reference(lookup("a/b/c")),
            Err(ConfigError::InvalidValue {
                key: CONFIGMAP_KEY,
                value: "a/b/c".to_owned(),
            })
        );
    }

    #[test]
    fn legacy_secret_name_is_a_template_spec() {
        let config = config_from(&[(
            INFRASTRUCTURE_ROLES_SECRET_NAME_KEY,
            "default/infrastructureroles-test",
        )])
        .unwrap();

        assert_eq!(
            config.infrastructure_roles,
            vec![InfrastructureRoleSpec::templated(NamespacedName::new(
                "default",
                "infrastructureroles-test"
            ))]
        );
    }

    #[test]
    fn role_definitions_are_parsed_in_order() {
        let config = config_from(&[
            (INFRASTRUCTURE_ROLES_SECRET_NAME_KEY, "legacy"),
            (
                INFRASTRUCTURE_ROLES_SECRETS_KEY,
                "secretname:ops/monitoring,userkey:login,passwordkey:secret,rolekey:groups; \
                 secretname:ops/batch,template:true;",
            ),
        ])
        .unwrap();

        assert_eq!(
            config.infrastructure_roles,
            vec![
                InfrastructureRoleSpec::templated(NamespacedName::new("default", "legacy")),
                InfrastructureRoleSpec {
                    secret: NamespacedName::new("ops", "monitoring"),
                    user_key: "login".to_owned(),
                    password_key: "secret".to_owned(),
                    role_key: "groups".to_owned(),
                    template: false,
                },
                InfrastructureRoleSpec::templated(NamespacedName::new("ops", "batch")),
            ]
        );
    }

    #[test]
    fn bad_role_definitions_are_rejected() {
        for definition in [
            "userkey:login",
            "secretname",
            "secretname:",
            "secretname:a/b/c",
            "secretname:ops/x,template:maybe",
            "secretname:ops/x,colour:blue",
        ] {
            let result = parse_infrastructure_roles(definition);

            assert!(
                matches!(result, Err(ConfigError::MalformedRoleSpec { .. })),
                "{definition} => {result:?}"
            );
        }
    }
}
