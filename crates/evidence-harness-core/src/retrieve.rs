//! Dual-strategy candidate retrieval.
//!
//! A query is sent through two independently configured retrieval
//! strategies: the *context* pass and the *query* pass. The identifier sets
//! of both are later intersected (see [`fusion`](crate::fusion)), so a chunk
//! only counts as evidence when both strategies agree on it.
//!
//! The two passes are deliberately separate configuration points. With
//! identical parameters the intersection is a no-op; giving them a different
//! `k` or [`DistanceMetric`] is what makes the agreement filter useful.
//!
//! Both passes run concurrently and are joined before identifiers are
//! computed. Each is bounded by a timeout; a timeout or index error fails
//! the query, since there is no fallback for missing candidates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::embedding::Embedder;
use crate::index::{DistanceMetric, VectorIndex};
use crate::models::Chunk;

/// A way of turning query text into ranked chunks.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    /// Short label used in logs and errors (e.g. `"context"`).
    fn name(&self) -> &str;

    /// Up to `k` chunks, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

/// Per-pass search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PassConfig {
    /// Overrides the query-level `k` for this pass.
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub metric: DistanceMetric,
}

/// Embed the query and search a [`VectorIndex`].
pub struct IndexStrategy {
    name: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    pass: PassConfig,
}

impl IndexStrategy {
    pub fn new(
        name: impl Into<String>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        pass: PassConfig,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            embedder,
            pass,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for IndexStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let k = self.pass.k.unwrap_or(k);
        let query_vec = self
            .embedder
            .embed_one(query)
            .await
            .with_context(|| format!("{} pass: failed to embed query", self.name))?;
        self.index
            .similarity_search(&query_vec, k, self.pass.metric)
            .await
    }
}

/// Output of [`DualRetriever::retrieve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualRetrieval {
    pub context_ids: HashSet<String>,
    pub query_ids: HashSet<String>,
    /// Query-pass results in rank order; input to compression.
    pub query_docs: Vec<Chunk>,
}

/// Runs the context and query passes side by side.
pub struct DualRetriever {
    context: Arc<dyn RetrievalStrategy>,
    query: Arc<dyn RetrievalStrategy>,
    timeout: Duration,
}

impl DualRetriever {
    pub fn new(
        context: Arc<dyn RetrievalStrategy>,
        query: Arc<dyn RetrievalStrategy>,
        timeout: Duration,
    ) -> Self {
        Self {
            context,
            query,
            timeout,
        }
    }

    /// Two index-backed passes over the same index and embedder.
    pub fn over_index(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        context_pass: PassConfig,
        query_pass: PassConfig,
        timeout: Duration,
    ) -> Self {
        let context = IndexStrategy::new("context", index.clone(), embedder.clone(), context_pass);
        let query = IndexStrategy::new("query", index, embedder, query_pass);
        Self::new(Arc::new(context), Arc::new(query), timeout)
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<DualRetrieval> {
        if k == 0 {
            bail!("retrieval k must be >= 1");
        }

        let (context_docs, query_docs) = tokio::join!(
            run_pass(self.context.as_ref(), query, k, self.timeout),
            run_pass(self.query.as_ref(), query, k, self.timeout),
        );
        let context_docs = context_docs?;
        let query_docs = query_docs?;

        debug!(
            context = context_docs.len(),
            query = query_docs.len(),
            k,
            "dual retrieval complete"
        );

        Ok(DualRetrieval {
            context_ids: context_docs.into_iter().map(|c| c.id).collect(),
            query_ids: query_docs.iter().map(|c| c.id.clone()).collect(),
            query_docs,
        })
    }
}

async fn run_pass(
    strategy: &dyn RetrievalStrategy,
    query: &str,
    k: usize,
    timeout: Duration,
) -> Result<Vec<Chunk>> {
    let name = strategy.name();
    tokio::time::timeout(timeout, strategy.search(query, k))
        .await
        .map_err(|_| anyhow!("{} pass timed out after {:?}", name, timeout))?
        .with_context(|| format!("{} pass failed", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;

    struct FixedStrategy {
        name: &'static str,
        ids: Vec<&'static str>,
        delay: Duration,
    }

    impl FixedStrategy {
        fn new(name: &'static str, ids: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                ids,
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl RetrievalStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str, k: usize) -> Result<Vec<Chunk>> {
            tokio::time::sleep(self.delay).await;
            Ok(self
                .ids
                .iter()
                .take(k)
                .map(|id| {
                    let (source, index) = crate::chunk_id::split_chunk_id(id).unwrap();
                    Chunk::new(source, index, format!("text of {}", id))
                })
                .collect())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl RetrievalStrategy for FailingStrategy {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Chunk>> {
            bail!("index unreachable")
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_collects_both_id_sets() {
        let retriever = DualRetriever::new(
            FixedStrategy::new("context", vec!["d:0", "d:1", "d:2"]),
            FixedStrategy::new("query", vec!["d:3", "d:1", "d:2"]),
            timeout(),
        );
        let out = retriever.retrieve("q", 5).await.unwrap();
        assert_eq!(out.context_ids.len(), 3);
        assert!(out.query_ids.contains("d:3"));
        let order: Vec<&str> = out.query_docs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["d:3", "d:1", "d:2"]);
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let retriever = DualRetriever::new(
            FixedStrategy::new("context", vec![]),
            FixedStrategy::new("query", vec![]),
            timeout(),
        );
        assert!(retriever.retrieve("q", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_index_is_not_an_error() {
        let retriever = DualRetriever::over_index(
            Arc::new(InMemoryIndex::new()),
            Arc::new(UnitEmbedder),
            PassConfig::default(),
            PassConfig::default(),
            timeout(),
        );
        let out = retriever.retrieve("anything", 5).await.unwrap();
        assert!(out.context_ids.is_empty());
        assert!(out.query_ids.is_empty());
        assert!(out.query_docs.is_empty());
    }

    #[tokio::test]
    async fn test_pass_k_override() {
        let index = Arc::new(InMemoryIndex::new());
        let chunks: Vec<Chunk> = (0..4).map(|i| Chunk::new("d", i, "x")).collect();
        let vectors = vec![vec![1.0, 0.0]; 4];
        index.add(&chunks, &vectors).await.unwrap();

        let retriever = DualRetriever::over_index(
            index,
            Arc::new(UnitEmbedder),
            PassConfig {
                k: Some(1),
                metric: DistanceMetric::Cosine,
            },
            PassConfig::default(),
            timeout(),
        );
        let out = retriever.retrieve("q", 3).await.unwrap();
        assert_eq!(out.context_ids.len(), 1);
        assert_eq!(out.query_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_pass_failure_is_fatal() {
        let retriever = DualRetriever::new(
            FixedStrategy::new("context", vec!["d:0"]),
            Arc::new(FailingStrategy),
            timeout(),
        );
        let err = retriever.retrieve("q", 5).await.unwrap_err();
        assert!(format!("{:#}", err).contains("broken pass failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_timeout() {
        let slow = Arc::new(FixedStrategy {
            name: "query",
            ids: vec!["d:0"],
            delay: Duration::from_secs(60),
        });
        let retriever = DualRetriever::new(
            FixedStrategy::new("context", vec!["d:0"]),
            slow,
            Duration::from_secs(1),
        );
        let err = retriever.retrieve("q", 5).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
