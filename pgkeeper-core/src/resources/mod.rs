use std::borrow::Cow;

use thiserror::Error;

pub mod annotations;
pub mod cluster;
pub mod crd;
pub mod labels;
pub mod object;

#[derive(Debug, Error)]
pub enum ResourceGenerationError {
    #[error("Resource contains invalid data ({})!", .0)]
    InvalidData(Cow<'static, str>),
    #[error("Resource is missing required data ({})!", .0)]
    MissingData(Cow<'static, str>),
    #[error("Provided dependent resource is missing a name!")]
    DependentMissingMetadataName,
    #[error("Resource content couldn't be hashed! Reason: {}", .0)]
    Hashing(serde_json::Error),
}
