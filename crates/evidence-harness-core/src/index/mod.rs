//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only way the pipeline reaches persisted
//! chunks. The index exclusively owns chunk storage; the pipeline reads from
//! it through similarity search and writes to it through the deduplicated
//! addition plan.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`similarity_search`](VectorIndex::similarity_search) | Top-`k` chunks for a query vector |
//! | [`existing_ids`](VectorIndex::existing_ids) | Every persisted chunk id |
//! | [`add`](VectorIndex::add) | Persist chunks with vectors, idempotent by id |
//! | [`get`](VectorIndex::get) | Fetch one chunk by id |
//! | [`count`](VectorIndex::count) | Number of persisted chunks |
//! | [`clear`](VectorIndex::clear) | Drop everything |

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::embedding::{cosine_similarity, dot_product, euclidean_distance};
use crate::models::Chunk;

/// How a search pass compares the query vector with stored vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    /// Relevance of `stored` to `query`; higher is always better.
    ///
    /// Euclidean distance is negated so callers can sort one way.
    pub fn score(self, query: &[f32], stored: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(query, stored),
            DistanceMetric::DotProduct => dot_product(query, stored),
            DistanceMetric::Euclidean => -euclidean_distance(query, stored),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dot_product",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot_product" => Ok(DistanceMetric::DotProduct),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => anyhow::bail!(
                "Unknown distance metric: '{}'. Must be cosine, dot_product, or euclidean.",
                other
            ),
        }
    }
}

/// Persistent store of embedded chunks.
///
/// # Required properties
///
/// - `add` must be idempotent by chunk id: adding an id that already exists
///   leaves the stored chunk untouched and never creates a duplicate. The
///   ingestion planner relies on this to make racing runs safe.
/// - `similarity_search` returns at most `k` chunks, best first. When fewer
///   than `k` chunks are stored it returns all of them; an empty index
///   returns an empty vector, not an error.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`k` chunks by `metric` against `query_vec`.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Chunk>>;

    /// Identifiers of every persisted chunk.
    async fn existing_ids(&self) -> Result<HashSet<String>>;

    /// Persist `chunks` with their `vectors` (same length, same order).
    async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Fetch a chunk by id.
    async fn get(&self, id: &str) -> Result<Option<Chunk>>;

    /// Number of persisted chunks.
    async fn count(&self) -> Result<usize>;

    /// Remove every chunk.
    async fn clear(&self) -> Result<()>;
}

/// Rank `(chunk, vector)` pairs against `query_vec` and keep the best `k`.
///
/// Shared by index backends that search by brute force. Ties keep the
/// input order.
pub fn rank_candidates<'a, I>(
    query_vec: &[f32],
    candidates: I,
    k: usize,
    metric: DistanceMetric,
) -> Vec<Chunk>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    let mut scored: Vec<(f32, &Chunk)> = candidates
        .into_iter()
        .map(|(chunk, vector)| (metric.score(query_vec, vector), chunk))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);
    scored.into_iter().map(|(_, chunk)| chunk.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_from_str() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(
            "dot_product".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::DotProduct
        );
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_euclidean_prefers_closer() {
        let q = [0.0, 0.0];
        let near = DistanceMetric::Euclidean.score(&q, &[1.0, 0.0]);
        let far = DistanceMetric::Euclidean.score(&q, &[5.0, 0.0]);
        assert!(near > far);
    }

    #[test]
    fn test_rank_candidates_truncates_and_orders() {
        let a = Chunk::new("d", 0, "a");
        let b = Chunk::new("d", 1, "b");
        let c = Chunk::new("d", 2, "c");
        let va = [1.0f32, 0.0];
        let vb = [0.7f32, 0.7];
        let vc = [0.0f32, 1.0];
        let ranked = rank_candidates(
            &[1.0, 0.0],
            vec![(&c, &vc[..]), (&a, &va[..]), (&b, &vb[..])],
            2,
            DistanceMetric::Cosine,
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["d:0", "d:1"]);
    }
}
