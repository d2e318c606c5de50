use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::cluster::NamespacedName;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("NotFound")]
    NotFound,
    #[error("Timeout")]
    Timeout,
    #[error("{}", .0)]
    Api(String),
}

/// Read access to secrets holding credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(
        &self,
        secret: &NamespacedName,
    ) -> Result<BTreeMap<String, Vec<u8>>, SecretStoreError>;
}
