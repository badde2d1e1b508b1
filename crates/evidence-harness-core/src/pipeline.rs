//! Query and ingestion entry points.
//!
//! [`EvidencePipeline`] wires the retrieval components together:
//!
//! 1. [`DualRetriever`] runs the context and query passes.
//! 2. [`SimilarityCompressor`] filters the query-pass results.
//! 3. [`fuse`] keeps compressed chunks both passes agreed on.
//! 4. [`Reranker`] (optional) reorders the fused evidence.
//!
//! The pipeline holds no per-query state, so one instance serves any number
//! of sequential queries.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::compress::SimilarityCompressor;
use crate::dedup::AdditionPlan;
use crate::fusion::fuse;
use crate::models::{Chunk, EvidenceItem};
use crate::rerank::{RerankOutcome, Reranker};
use crate::retrieve::DualRetriever;

/// Evidence for one query plus diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    /// Per-pass retrieval budget the query ran with.
    pub k: usize,
    /// Compression threshold the query ran with.
    pub threshold: f32,
    /// Final evidence, best first, unique by `chunk_id`.
    pub evidence: Vec<EvidenceItem>,
    /// Query-pass candidates before compression.
    pub candidates: usize,
    /// Candidates surviving compression.
    pub compressed: usize,
    /// Present when a reranker is configured and there was evidence to rank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankOutcome>,
}

impl QueryResult {
    /// Chunk ids in evidence order.
    pub fn sources(&self) -> Vec<String> {
        self.evidence.iter().map(|e| e.chunk_id.clone()).collect()
    }
}

pub struct EvidencePipeline {
    retriever: DualRetriever,
    compressor: SimilarityCompressor,
    reranker: Option<Reranker>,
    k: usize,
}

impl EvidencePipeline {
    pub fn new(retriever: DualRetriever, compressor: SimilarityCompressor, k: usize) -> Self {
        Self {
            retriever,
            compressor,
            reranker: None,
            k,
        }
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn threshold(&self) -> f32 {
        self.compressor.threshold()
    }

    /// Run retrieval, compression, fusion and (optionally) reranking.
    ///
    /// Retrieval and compression failures fail the query. Reranking never
    /// does; its degradation is reported in [`QueryResult::rerank`].
    pub async fn query(&self, query: &str) -> Result<QueryResult> {
        let retrieval = self
            .retriever
            .retrieve(query, self.k)
            .await
            .context("candidate retrieval failed")?;

        let candidates = retrieval.query_docs.len();
        let compressed = self
            .compressor
            .compress(query, retrieval.query_docs)
            .await
            .context("similarity compression failed")?;
        let compressed_count = compressed.len();

        let fused = fuse(compressed, &retrieval.context_ids, &retrieval.query_ids);
        debug!(candidates, compressed = compressed_count, fused = fused.len(), "fused evidence");

        let (evidence, rerank) = match &self.reranker {
            Some(reranker) if !fused.is_empty() => {
                let (ordered, outcome) = rerank_chunks(reranker, query, fused).await;
                (ordered, Some(outcome))
            }
            _ => (fused, None),
        };

        info!(evidence = evidence.len(), "query complete");

        Ok(QueryResult {
            query: query.to_string(),
            k: self.k(),
            threshold: self.threshold(),
            evidence: evidence.into_iter().map(EvidenceItem::from).collect(),
            candidates,
            compressed: compressed_count,
            rerank,
        })
    }

    /// Plan an ingestion batch against the ids currently in the index.
    pub fn plan_ingestion(candidates: Vec<Chunk>, existing_ids: &HashSet<String>) -> AdditionPlan {
        AdditionPlan::build(candidates, existing_ids)
    }
}

async fn rerank_chunks(
    reranker: &Reranker,
    query: &str,
    fused: Vec<Chunk>,
) -> (Vec<Chunk>, RerankOutcome) {
    let ids: Vec<String> = fused.iter().map(|c| c.id.clone()).collect();
    let mut by_id: HashMap<String, Chunk> = fused.into_iter().map(|c| (c.id.clone(), c)).collect();

    let outcome = reranker
        .rerank(query, &ids, |id| by_id.get(id).map(|c| c.content.clone()))
        .await;

    let ordered = outcome
        .order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();
    (ordered, outcome)
}
