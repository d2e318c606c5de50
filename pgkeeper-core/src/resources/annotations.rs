use std::collections::BTreeMap;

use kube::{core::ObjectMeta, Resource};
use serde::Serialize;

use crate::hash::fnv1a_64;

use super::ResourceGenerationError;

pub const SPEC_HASH_ANNOTATION: &str = "pgkeeper.dev/spec-hash";

pub fn compute_spec_hash<T: Serialize>(content: &T) -> Result<String, ResourceGenerationError> {
    let serialized = serde_json::to_vec(content).map_err(ResourceGenerationError::Hashing)?;

    Ok(format!("{:016x}", fnv1a_64(&serialized)))
}

pub fn get_spec_hash_annotations(hash: String) -> BTreeMap<String, String> {
    BTreeMap::from([(SPEC_HASH_ANNOTATION.to_owned(), hash)])
}

pub fn read_spec_hash(metadata: &ObjectMeta) -> Option<&str> {
    metadata
        .annotations
        .as_ref()?
        .get(SPEC_HASH_ANNOTATION)
        .map(String::as_str)
}

/// Stamps an object with the hash of its own content, so a later
/// reconciliation can tell whether the copy on the cluster is up to date.
pub fn annotate_spec_hash<T: Resource + Serialize>(
    mut object: T,
) -> Result<T, ResourceGenerationError> {
    let hash = compute_spec_hash(&object)?;

    object
        .meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(get_spec_hash_annotations(hash));

    Ok(object)
}
