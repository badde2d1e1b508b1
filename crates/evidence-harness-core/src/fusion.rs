//! Intersection fusion.
//!
//! A chunk becomes evidence only if it was in the top-`k` of *both*
//! retrieval passes *and* survived similarity compression. The compressed
//! order is kept; duplicate ids are dropped so the evidence set is unique.

use std::collections::HashSet;

use crate::models::Chunk;

/// Keep `compressed` chunks whose id is in `context_ids ∩ query_ids`.
///
/// An empty result is a normal outcome, not an error.
pub fn fuse(
    compressed: Vec<Chunk>,
    context_ids: &HashSet<String>,
    query_ids: &HashSet<String>,
) -> Vec<Chunk> {
    let mut emitted: HashSet<String> = HashSet::new();
    compressed
        .into_iter()
        .filter(|chunk| context_ids.contains(&chunk.id) && query_ids.contains(&chunk.id))
        .filter(|chunk| emitted.insert(chunk.id.clone()))
        .collect()
}
