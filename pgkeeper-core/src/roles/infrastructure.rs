use std::collections::BTreeMap;

use log::debug;
use thiserror::Error;

use crate::{cluster::NamespacedName, helpers::split_unique_list};

use super::{
    store::{SecretStore, SecretStoreError},
    InfrastructureRoleSpec, PgUser, RoleOrigin,
};

pub type RoleMap = BTreeMap<String, PgUser>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("could not get infrastructure roles secret: {source}")]
    SecretFetch {
        secret: NamespacedName,
        source: SecretStoreError,
    },
    #[error("infrastructure roles secret '{secret}' is missing the '{field}' field")]
    MissingField {
        secret: NamespacedName,
        field: String,
    },
    #[error("infrastructure roles secret '{secret}' has a non UTF-8 '{field}' field")]
    InvalidField {
        secret: NamespacedName,
        field: String,
    },
    #[error("infrastructure role '{role}' from secret '{secret}' collides with an already defined role")]
    Collision {
        secret: NamespacedName,
        role: String,
    },
}

impl RoleError {
    /// A secret that couldn't be read for a reason other than its absence,
    /// the roles it holds are unknown rather than gone.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RoleError::SecretFetch { source, .. } if *source != SecretStoreError::NotFound
        )
    }
}

/// Merges the roles of every configured secret into one map.
///
/// Never stops early: a spec that can't be read or a role that collides with
/// an earlier one is reported in the error list and the remaining specs are
/// still processed. On collisions the first definition wins, so the same
/// ordered input always produces the same output.
pub async fn resolve_infrastructure_roles<S>(
    store: &S,
    specs: &[InfrastructureRoleSpec],
) -> (RoleMap, Vec<RoleError>)
where
    S: SecretStore + ?Sized,
{
    let mut sink = RoleSink::default();

    for spec in specs {
        if spec.secret.is_empty() {
            continue;
        }

        let data = match store.get_secret(&spec.secret).await {
            Ok(data) => data,
            Err(source) => {
                sink.errors.push(RoleError::SecretFetch {
                    secret: spec.secret.clone(),
                    source,
                });
                continue;
            }
        };

        if spec.template {
            read_templated_roles(spec, data, &mut sink);
        } else {
            read_single_role(spec, &data, &mut sink);
        }
    }

    (sink.roles, sink.errors)
}

#[derive(Default)]
struct RoleSink {
    roles: RoleMap,
    errors: Vec<RoleError>,
}

impl RoleSink {
    fn insert(&mut self, secret: &NamespacedName, user: PgUser) {
        if self.roles.contains_key(&user.name) {
            self.errors.push(RoleError::Collision {
                secret: secret.clone(),
                role: user.name,
            });
            return;
        }

        debug!("Resolved infrastructure role '{}' from '{secret}'", user.name);
        self.roles.insert(user.name.clone(), user);
    }
}

fn read_templated_roles(
    spec: &InfrastructureRoleSpec,
    mut data: BTreeMap<String, Vec<u8>>,
    sink: &mut RoleSink,
) {
    let secret = &spec.secret;

    for index in 1..=data.len() {
        let user_field = format!("{}{index}", spec.user_key);
        let password_field = format!("{}{index}", spec.password_key);
        let role_field = format!("{}{index}", spec.role_key);

        let user = data.remove(&user_field);
        let password = data.remove(&password_field);
        let member_of = data.remove(&role_field);

        let Some(user) = user else {
            continue;
        };

        let role = build_role(
            secret,
            (&user_field, &user),
            (&password_field, password.as_deref()),
            (&role_field, member_of.as_deref()),
        );

        match role {
            Ok(role) => sink.insert(secret, role),
            Err(error) => sink.errors.push(error),
        }
    }

    // whatever the templates didn't claim is a plain `role: password` pair
    for (name, password) in data {
        match decode(secret, &name, &password) {
            Ok(password) => sink.insert(
                secret,
                PgUser {
                    password,
                    ..PgUser::new(name, RoleOrigin::Infrastructure)
                },
            ),
            Err(error) => sink.errors.push(error),
        }
    }
}

fn read_single_role(
    spec: &InfrastructureRoleSpec,
    data: &BTreeMap<String, Vec<u8>>,
    sink: &mut RoleSink,
) {
    let secret = &spec.secret;
    let Some(user) = data.get(&spec.user_key) else {
        sink.errors.push(RoleError::MissingField {
            secret: secret.clone(),
            field: spec.user_key.to_owned(),
        });
        return;
    };

    let role = build_role(
        secret,
        (&spec.user_key, user),
        (&spec.password_key, data.get(&spec.password_key).map(Vec::as_slice)),
        (&spec.role_key, data.get(&spec.role_key).map(Vec::as_slice)),
    );

    match role {
        Ok(role) => sink.insert(secret, role),
        Err(error) => sink.errors.push(error),
    }
}

fn build_role(
    secret: &NamespacedName,
    (user_field, user): (&str, &[u8]),
    (password_field, password): (&str, Option<&[u8]>),
    (role_field, member_of): (&str, Option<&[u8]>),
) -> Result<PgUser, RoleError> {
    let name = decode(secret, user_field, user)?;
    if name.trim().is_empty() {
        return Err(RoleError::MissingField {
            secret: secret.clone(),
            field: user_field.to_owned(),
        });
    }

    let password = match password {
        Some(password) => decode(secret, password_field, password)?,
        None => String::new(),
    };
    let member_of = match member_of {
        Some(member_of) => split_unique_list(&decode(secret, role_field, member_of)?),
        None => Vec::new(),
    };

    Ok(PgUser {
        password,
        member_of,
        ..PgUser::new(name.trim(), RoleOrigin::Infrastructure)
    })
}

/// Values are used verbatim, an already encoded password stays encoded.
fn decode(secret: &NamespacedName, field: &str, value: &[u8]) -> Result<String, RoleError> {
    String::from_utf8(value.to_vec()).map_err(|_| RoleError::InvalidField {
        secret: secret.clone(),
        field: field.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use crate::{
        cluster::NamespacedName,
        roles::{
            store::{SecretStore, SecretStoreError},
            InfrastructureRoleSpec, PgUser, RoleOrigin,
        },
    };

    use super::{resolve_infrastructure_roles, RoleError};

    const TEST_SECRET: &str = "infrastructureroles-test";
    // base64 of "password", stored as is
    const ENCODED_PASSWORD: &str = "cGFzc3dvcmQ=";

    #[derive(Default)]
    struct FakeSecretStore {
        secrets: BTreeMap<NamespacedName, BTreeMap<String, Vec<u8>>>,
    }

    impl FakeSecretStore {
        fn with_secret(mut self, name: &str, data: &[(&str, &[u8])]) -> Self {
            self.secrets.insert(
                NamespacedName::new("default", name),
                data.iter()
                    .map(|(key, value)| (key.to_string(), value.to_vec()))
                    .collect(),
            );

            self
        }
    }

    #[async_trait]
    impl SecretStore for FakeSecretStore {
        async fn get_secret(
            &self,
            secret: &NamespacedName,
        ) -> Result<BTreeMap<String, Vec<u8>>, SecretStoreError> {
            self.secrets
                .get(secret)
                .cloned()
                .ok_or(SecretStoreError::NotFound)
        }
    }

    fn test_store() -> FakeSecretStore {
        FakeSecretStore::default()
            .with_secret(
                TEST_SECRET,
                &[
                    ("user1", b"testrole"),
                    ("password1", b"testpassword"),
                    ("inrole1", b"testinrole"),
                    ("foobar", ENCODED_PASSWORD.as_bytes()),
                ],
            )
            .with_secret(
                "monitoring-role",
                &[
                    ("user", b"monitor"),
                    ("password", b"monitorpass"),
                    ("inrole", b"pg_monitor, readers,pg_monitor"),
                ],
            )
            .with_secret(
                "conflicting-role",
                &[("user", b"testrole"), ("password", b"otherpassword")],
            )
    }

    fn templated(name: &str) -> InfrastructureRoleSpec {
        InfrastructureRoleSpec::templated(NamespacedName::new("default", name))
    }

    fn plain(name: &str) -> InfrastructureRoleSpec {
        InfrastructureRoleSpec::new(NamespacedName::new("default", name))
    }

    fn expected_test_roles() -> BTreeMap<String, PgUser> {
        BTreeMap::from([
            (
                "testrole".to_owned(),
                PgUser {
                    password: "testpassword".to_owned(),
                    member_of: vec!["testinrole".to_owned()],
                    ..PgUser::new("testrole", RoleOrigin::Infrastructure)
                },
            ),
            (
                "foobar".to_owned(),
                PgUser {
                    password: ENCODED_PASSWORD.to_owned(),
                    ..PgUser::new("foobar", RoleOrigin::Infrastructure)
                },
            ),
        ])
    }

    #[tokio::test]
    async fn templated_secret_yields_indexed_and_legacy_roles() {
        let (roles, errors) =
            resolve_infrastructure_roles(&test_store(), &[templated(TEST_SECRET)]).await;

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(roles, expected_test_roles());
    }

    #[tokio::test]
    async fn empty_input_is_a_successful_no_op() {
        let store = test_store();

        let (roles, errors) = resolve_infrastructure_roles(&store, &[]).await;
        assert!(roles.is_empty());
        assert!(errors.is_empty());

        let unset = InfrastructureRoleSpec::templated(NamespacedName::default());
        let (roles, errors) = resolve_infrastructure_roles(&store, &[unset.clone(), unset]).await;
        assert!(roles.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn missing_secret_is_reported_as_not_found() {
        let (roles, errors) = resolve_infrastructure_roles(&test_store(), &[templated("null")]).await;

        assert!(roles.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "could not get infrastructure roles secret: NotFound"
        );
    }

    #[tokio::test]
    async fn missing_secret_does_not_stop_later_specs() {
        let (roles, errors) =
            resolve_infrastructure_roles(&test_store(), &[templated("null"), plain("monitoring-role")])
                .await;

        assert_eq!(roles.keys().collect::<Vec<_>>(), vec!["monitor"]);
        assert_eq!(
            errors,
            vec![RoleError::SecretFetch {
                secret: NamespacedName::new("default", "null"),
                source: SecretStoreError::NotFound,
            }]
        );
    }

    #[tokio::test]
    async fn plain_secret_splits_memberships() {
        let (roles, errors) =
            resolve_infrastructure_roles(&test_store(), &[plain("monitoring-role")]).await;

        assert!(errors.is_empty());
        assert_eq!(
            roles["monitor"],
            PgUser {
                password: "monitorpass".to_owned(),
                member_of: vec!["pg_monitor".to_owned(), "readers".to_owned()],
                ..PgUser::new("monitor", RoleOrigin::Infrastructure)
            }
        );
    }

    #[tokio::test]
    async fn collisions_keep_the_first_definition() {
        let (roles, errors) = resolve_infrastructure_roles(
            &test_store(),
            &[templated(TEST_SECRET), plain("conflicting-role")],
        )
        .await;

        assert_eq!(roles, expected_test_roles());
        assert_eq!(
            errors,
            vec![RoleError::Collision {
                secret: NamespacedName::new("default", "conflicting-role"),
                role: "testrole".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn resolving_twice_gives_identical_results() {
        let store = test_store();
        let specs = [
            templated(TEST_SECRET),
            templated("null"),
            plain("conflicting-role"),
            plain("monitoring-role"),
        ];

        let first = resolve_infrastructure_roles(&store, &specs).await;
        let second = resolve_infrastructure_roles(&store, &specs).await;

        assert_eq!(first, second);
        assert_eq!(first.0.len(), 3);
        assert_eq!(first.1.len(), 2);
    }

    #[tokio::test]
    async fn plain_secret_without_user_field_is_an_error() {
        let store = FakeSecretStore::default().with_secret("broken", &[("password", b"x")]);

        let (roles, errors) = resolve_infrastructure_roles(&store, &[plain("broken")]).await;

        assert!(roles.is_empty());
        assert_eq!(
            errors,
            vec![RoleError::MissingField {
                secret: NamespacedName::new("default", "broken"),
                field: "user".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn non_utf8_values_only_drop_the_affected_role() {
        let store = FakeSecretStore::default().with_secret(
            "mixed",
            &[
                ("user1", b"good"),
                ("password1", b"fine"),
                ("user2", b"bad"),
                ("password2", &[0xff, 0xfe]),
            ],
        );

        let (roles, errors) = resolve_infrastructure_roles(&store, &[templated("mixed")]).await;

        assert_eq!(roles.keys().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(
            errors,
            vec![RoleError::InvalidField {
                secret: NamespacedName::new("default", "mixed"),
                field: "password2".to_owned(),
            }]
        );
    }

    #[test]
    fn only_unreadable_secrets_are_transient() {
        let secret = NamespacedName::new("default", TEST_SECRET);
        let fetch = |source| RoleError::SecretFetch {
            secret: secret.clone(),
            source,
        };

        assert!(fetch(SecretStoreError::Timeout).is_transient());
        assert!(fetch(SecretStoreError::Api("connection refused".to_owned())).is_transient());
        assert!(!fetch(SecretStoreError::NotFound).is_transient());
        assert!(!RoleError::Collision {
            secret: secret.clone(),
            role: "testrole".to_owned(),
        }
        .is_transient());
    }
}
