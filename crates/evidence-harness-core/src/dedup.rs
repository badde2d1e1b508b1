//! Ingestion addition planning.
//!
//! Given freshly chunked documents and the identifiers already persisted in
//! the index, compute the minimal set of chunks to add. Planning is a pure
//! filter: it never writes. The caller fetches the existing identifiers
//! immediately before planning and commits the plan afterwards.
//!
//! Two ingestion runs racing against the same index can both plan the same
//! additions. That is safe only because [`VectorIndex::add`] is idempotent by
//! identifier; planning does not try to close the race itself.
//!
//! [`VectorIndex::add`]: crate::index::VectorIndex::add

use std::collections::HashSet;

use crate::chunk_id::identify;
use crate::models::Chunk;

/// Result of planning one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionPlan {
    /// Chunks to add, in original relative order.
    pub additions: Vec<Chunk>,
    /// Number of candidates dropped because their id was already present.
    pub skipped: usize,
}

impl AdditionPlan {
    /// Plan additions and count what was skipped.
    ///
    /// Candidates repeating an id seen earlier in the same batch are
    /// skipped too (first occurrence wins), so a plan never submits the
    /// same id twice.
    pub fn build(candidates: Vec<Chunk>, existing_ids: &HashSet<String>) -> Self {
        let total = candidates.len();
        let mut planned: HashSet<String> = HashSet::new();
        let additions: Vec<Chunk> = plan_additions(candidates, existing_ids)
            .into_iter()
            .filter(|chunk| planned.insert(chunk.id.clone()))
            .collect();
        let skipped = total - additions.len();
        Self { additions, skipped }
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
    }
}

/// Drop candidates whose identifier is already persisted.
///
/// Each candidate is re-stamped through [`identify`] first, so a chunk
/// carrying a stale or hand-built `id` is still judged by its position.
pub fn plan_additions(candidates: Vec<Chunk>, existing_ids: &HashSet<String>) -> Vec<Chunk> {
    candidates
        .into_iter()
        .map(|mut chunk| {
            chunk.id = identify(&chunk.source_id, chunk.sequence_index);
            chunk
        })
        .filter(|chunk| !existing_ids.contains(&chunk.id))
        .collect()
}
