//! Similarity-threshold compression.
//!
//! Scores each candidate against the query with the embedding model and
//! keeps those at or above the threshold. This is a recall/precision gate,
//! not a ranking step: retained candidates keep their input order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::embedding::Embedder;
use crate::models::Chunk;

/// Default minimum similarity for a candidate to survive compression.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

/// Filters candidates by embedding similarity to the query.
pub struct SimilarityCompressor {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    timeout: Duration,
}

impl SimilarityCompressor {
    /// Compressor with [`DEFAULT_SIMILARITY_THRESHOLD`].
    pub fn new(embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self {
            embedder,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            timeout,
        }
    }

    /// Override the threshold. Must lie in `[0, 1]`.
    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("similarity threshold must be in [0.0, 1.0], got {}", threshold);
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn compress(&self, query: &str, candidates: Vec<Chunk>) -> Result<Vec<Chunk>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = tokio::time::timeout(self.timeout, self.embedder.similarities(query, &texts))
            .await
            .map_err(|_| anyhow!("similarity scoring timed out after {:?}", self.timeout))?
            .context("similarity scoring failed")?;

        if scores.len() != candidates.len() {
            bail!(
                "similarity count mismatch: {} candidates, {} scores",
                candidates.len(),
                scores.len()
            );
        }

        let before = candidates.len();
        let kept = retain_similar(candidates, &scores, self.threshold);
        debug!(before, after = kept.len(), threshold = self.threshold, "compressed candidates");
        Ok(kept)
    }
}

/// Keep candidates whose score is `>= threshold`, in input order.
///
/// `scores[i]` belongs to `candidates[i]`. NaN scores never pass.
pub fn retain_similar(candidates: Vec<Chunk>, scores: &[f32], threshold: f32) -> Vec<Chunk> {
    candidates
        .into_iter()
        .zip(scores.iter())
        .filter(|&(_, &score)| score >= threshold)
        .map(|(chunk, _)| chunk)
        .collect()
}
