use std::fmt::Display;

use log::warn;

use crate::{
    cluster::NamespacedName,
    resources::crd::v1alpha1::postgresql::PostgresqlSpec,
};

pub mod infrastructure;
pub mod store;

pub const SUPERUSER_NAME: &str = "postgres";
pub const REPLICATION_USER_NAME: &str = "standby";

pub const DEFAULT_USER_KEY: &str = "user";
pub const DEFAULT_PASSWORD_KEY: &str = "password";
pub const DEFAULT_ROLE_KEY: &str = "inrole";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOrigin {
    /// declared in the cluster manifest
    Manifest,
    /// sourced from a shared infrastructure roles secret
    Infrastructure,
    /// required by the database itself (superuser, replication)
    System,
}

impl Display for RoleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RoleOrigin::Manifest => "manifest",
            RoleOrigin::Infrastructure => "infrastructure",
            RoleOrigin::System => "system",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgUser {
    pub name: String,
    pub origin: RoleOrigin,
    pub password: String,
    /// group roles, in declaration order without repetitions
    pub member_of: Vec<String>,
    pub flags: Vec<String>,
}

impl PgUser {
    pub fn new(name: impl Into<String>, origin: RoleOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            password: String::new(),
            member_of: Vec::new(),
            flags: Vec::new(),
        }
    }
}

/// Where to read infrastructure roles from and how the secret is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfrastructureRoleSpec {
    /// an empty reference means no infrastructure roles are configured
    pub secret: NamespacedName,
    pub user_key: String,
    pub password_key: String,
    pub role_key: String,
    /// when set, the keys above are name templates completed with a role index
    /// (`user1`, `password1`, `inrole1`, `user2`, ...)
    pub template: bool,
}

impl InfrastructureRoleSpec {
    pub fn new(secret: NamespacedName) -> Self {
        Self {
            secret,
            user_key: DEFAULT_USER_KEY.to_owned(),
            password_key: DEFAULT_PASSWORD_KEY.to_owned(),
            role_key: DEFAULT_ROLE_KEY.to_owned(),
            template: false,
        }
    }

    pub fn templated(secret: NamespacedName) -> Self {
        Self {
            template: true,
            ..Self::new(secret)
        }
    }
}

pub fn system_roles() -> Vec<PgUser> {
    vec![
        PgUser {
            flags: vec!["superuser".to_owned()],
            ..PgUser::new(SUPERUSER_NAME, RoleOrigin::System)
        },
        PgUser {
            flags: vec!["replication".to_owned()],
            ..PgUser::new(REPLICATION_USER_NAME, RoleOrigin::System)
        },
    ]
}

/// System roles followed by the manifest roles that don't clash with them.
pub fn credential_roles(spec: &PostgresqlSpec) -> Vec<PgUser> {
    let mut roles = system_roles();

    for (name, flags) in &spec.users {
        if roles.iter().any(|role| &role.name == name) {
            warn!("Manifest role '{name}' clashes with a system role and will be ignored!");
            continue;
        }

        roles.push(PgUser {
            flags: flags.to_owned(),
            ..PgUser::new(name, RoleOrigin::Manifest)
        });
    }

    roles
}
