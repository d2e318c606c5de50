use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, ByteString};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::{
    resources::{annotations::annotate_spec_hash, ResourceGenerationError},
    roles::{infrastructure::RoleMap, PgUser},
};

use super::ClusterRelease;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const MEMBER_OF_SUFFIX: &str = ".inrole";
pub const GENERATED_PASSWORD_LENGTH: usize = 32;

pub fn generate_password() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Password stored in a credentials secret, if it holds a usable one.
pub fn secret_password(secret: &Secret) -> Option<String> {
    let password = secret.data.as_ref()?.get(PASSWORD_KEY)?;

    String::from_utf8(password.0.to_owned())
        .ok()
        .filter(|password| !password.is_empty())
}

impl ClusterRelease {
    /// Role names may contain underscores, object names may not.
    pub fn get_credentials_secret_name(&self, role: &str) -> String {
        format!(
            "{}.{}.credentials",
            role.replace('_', "-"),
            self.cluster_name()
        )
    }

    pub fn get_infrastructure_roles_secret_name(&self) -> String {
        format!("{}-infrastructure-roles", self.cluster_name())
    }

    pub fn generate_credentials_secret(
        &self,
        user: &PgUser,
        password: &str,
    ) -> Result<Secret, ResourceGenerationError> {
        if user.name.is_empty() {
            return Err(ResourceGenerationError::MissingData("role name".into()));
        }
        if password.is_empty() {
            return Err(ResourceGenerationError::MissingData(
                format!("password of {}", user.name).into(),
            ));
        }

        let data = BTreeMap::from([
            (
                USERNAME_KEY.to_owned(),
                ByteString(user.name.as_bytes().to_vec()),
            ),
            (
                PASSWORD_KEY.to_owned(),
                ByteString(password.as_bytes().to_vec()),
            ),
        ]);

        annotate_spec_hash(Secret {
            metadata: self.generate_cluster_metadata(self.get_credentials_secret_name(&user.name)),
            data: Some(data),
            type_: Some("Opaque".to_owned()),
            ..Default::default()
        })
    }

    /// Resolved infrastructure roles, passwords kept exactly as they were read.
    pub fn generate_infrastructure_roles_secret(
        &self,
        roles: &RoleMap,
    ) -> Result<Secret, ResourceGenerationError> {
        let mut data = BTreeMap::new();

        for (name, role) in roles {
            data.insert(name.to_owned(), ByteString(role.password.as_bytes().to_vec()));

            if !role.member_of.is_empty() {
                data.insert(
                    format!("{name}{MEMBER_OF_SUFFIX}"),
                    ByteString(role.member_of.join(",").into_bytes()),
                );
            }
        }

        annotate_spec_hash(Secret {
            metadata: self.generate_cluster_metadata(self.get_infrastructure_roles_secret_name()),
            data: Some(data),
            type_: Some("Opaque".to_owned()),
            ..Default::default()
        })
    }
}
