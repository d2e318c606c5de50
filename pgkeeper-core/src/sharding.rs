use std::num::NonZeroU32;

use crate::{cluster::ClusterIdentity, hash::{fnv1a_32, fnv1a_32_extend}};

pub type WorkerId = u32;

/// Maps a cluster to the worker that owns it.
///
/// The hash covers the identity's string form (`namespace/name`) and nothing
/// else, so a cluster lands on the same worker for any registry contents and
/// across controller restarts, as long as the worker count stays the same.
pub fn worker_id(identity: &ClusterIdentity, workers: NonZeroU32) -> WorkerId {
    identity_hash(identity) % workers.get()
}

fn identity_hash(identity: &ClusterIdentity) -> u32 {
    let hash = fnv1a_32(identity.namespace().as_bytes());
    let hash = fnv1a_32_extend(hash, b"/");

    fnv1a_32_extend(hash, identity.name().as_bytes())
}
