//! External relevance reranking.
//!
//! Reorders an evidence list by asking an external [`RelevanceScorer`] to
//! rate each chunk against the query on a 1–5 scale. The scorer is usually
//! a local model behind a subprocess or HTTP call, so the reranker is built
//! to degrade rather than fail:
//!
//! | Condition | Result | Signal |
//! |-----------|--------|--------|
//! | Health check fails or times out | input order, no scoring calls | [`RerankerState::Unavailable`], `warn!` "relevance scorer unavailable" |
//! | One chunk's call fails, times out, or returns junk | that chunk scores `0.0` | counted in [`RerankOutcome::failures`], `warn!` per chunk |
//! | Everything succeeds | stable sort by score, descending | [`RerankerState::Ready`] |
//!
//! # State Machine
//!
//! ```text
//! NotInitialized ──▶ HealthChecking ──┬──▶ Ready        (score every chunk)
//!                                     └──▶ Unavailable  (terminal for this call)
//! ```
//!
//! There is no retry loop: an unavailable scorer is retried on the next
//! query, at the caller's discretion.
//!
//! Scoring calls run on a bounded pool (`max_concurrency` permits). Each
//! call has its own timeout; waiting for a permit does not count against it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Lowest score a successful call can produce.
pub const MIN_SCORE: f32 = 1.0;
/// Highest score a successful call can produce.
pub const MAX_SCORE: f32 = 5.0;
/// Sentinel for "unscored/failed".
pub const UNSCORED: f32 = 0.0;

/// A transient relevance score: `[1.0, 5.0]`, or [`UNSCORED`].
pub type RelevanceScore = f32;

/// Why a single scoring call produced no usable score.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring call timed out after {0:?}")]
    Timeout(Duration),

    #[error("scorer returned a non-numeric score: {0:?}")]
    NonNumeric(String),

    #[error("scorer process failed: {0}")]
    Process(String),

    #[error("scorer request failed: {0}")]
    Http(String),

    #[error("no content found for chunk {0}")]
    MissingContent(String),
}

/// External relevance judge.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// `true` if the scorer can be reached at all.
    async fn health_check(&self) -> bool;

    /// Rate `document` against `query`, nominally in `[1, 5]`.
    async fn score(&self, query: &str, document: &str) -> Result<f32, ScoringError>;
}

/// Parse raw model output into a clamped score.
///
/// ```rust
/// use evidence_harness_core::rerank::parse_score;
///
/// assert_eq!(parse_score(" 4.5\n").unwrap(), 4.5);
/// assert_eq!(parse_score("7").unwrap(), 5.0);
/// assert!(parse_score("very relevant").is_err());
/// ```
pub fn parse_score(output: &str) -> Result<f32, ScoringError> {
    let trimmed = output.trim();
    let value: f32 = trimmed
        .parse()
        .map_err(|_| ScoringError::NonNumeric(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(ScoringError::NonNumeric(trimmed.to_string()));
    }
    Ok(clamp_score(value))
}

/// Clamp into `[MIN_SCORE, MAX_SCORE]`.
pub fn clamp_score(value: f32) -> f32 {
    value.clamp(MIN_SCORE, MAX_SCORE)
}

/// Lifecycle of one [`Reranker::rerank`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerState {
    NotInitialized,
    HealthChecking,
    Ready,
    Unavailable,
}

/// Result of a rerank call. `order` is always usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankOutcome {
    /// Chunk ids in final presentation order.
    pub order: Vec<String>,
    /// State the call finished in.
    pub state: RerankerState,
    /// `(chunk_id, score)` in final order; empty unless the scorer was ready.
    pub scores: Vec<(String, RelevanceScore)>,
    /// Chunks that fell back to [`UNSCORED`].
    pub failures: usize,
}

/// Timeouts and pool size for reranking.
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub health_timeout: Duration,
    pub score_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(10),
            score_timeout: Duration::from_secs(30),
            max_concurrency: 1,
        }
    }
}

/// Reorders chunk ids by external relevance scores.
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    config: RerankerConfig,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, config: RerankerConfig) -> Self {
        Self { scorer, config }
    }

    /// Rerank `chunk_ids` for `query`.
    ///
    /// `fetch_content` resolves a chunk id to its text; a `None` counts as
    /// a scoring failure for that chunk. Never fails: every degraded path
    /// still yields an ordering of exactly the input ids.
    pub async fn rerank<F>(
        &self,
        query: &str,
        chunk_ids: &[String],
        fetch_content: F,
    ) -> RerankOutcome
    where
        F: Fn(&str) -> Option<String>,
    {
        if chunk_ids.is_empty() {
            return RerankOutcome {
                order: Vec::new(),
                state: RerankerState::NotInitialized,
                scores: Vec::new(),
                failures: 0,
            };
        }

        debug!(state = ?RerankerState::HealthChecking, "checking relevance scorer");
        if !self.is_healthy().await {
            return RerankOutcome {
                order: chunk_ids.to_vec(),
                state: RerankerState::Unavailable,
                scores: Vec::new(),
                failures: 0,
            };
        }

        let (scores, failures) = self.score_all(query, chunk_ids, fetch_content).await;

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        // Vec::sort_by is stable, so equal scores keep their input order.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let scores: Vec<(String, f32)> = ranked
            .into_iter()
            .map(|(pos, score)| (chunk_ids[pos].clone(), score))
            .collect();

        info!(chunks = chunk_ids.len(), failures, "reranked evidence");

        RerankOutcome {
            order: scores.iter().map(|(id, _)| id.clone()).collect(),
            state: RerankerState::Ready,
            scores,
            failures,
        }
    }

    async fn is_healthy(&self) -> bool {
        match tokio::time::timeout(self.config.health_timeout, self.scorer.health_check()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("relevance scorer unavailable: health check failed, keeping retrieval order");
                false
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.health_timeout,
                    "relevance scorer unavailable: health check timed out, keeping retrieval order"
                );
                false
            }
        }
    }

    async fn score_all<F>(
        &self,
        query: &str,
        chunk_ids: &[String],
        fetch_content: F,
    ) -> (Vec<f32>, usize)
    where
        F: Fn(&str) -> Option<String>,
    {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let score_timeout = self.config.score_timeout;
        let mut tasks = JoinSet::new();

        for (pos, id) in chunk_ids.iter().enumerate() {
            let content = fetch_content(id);
            let scorer = Arc::clone(&self.scorer);
            let permits = Arc::clone(&permits);
            let query = query.to_string();
            let id = id.clone();

            tasks.spawn(async move {
                let Some(text) = content else {
                    return (pos, Err(ScoringError::MissingContent(id)));
                };
                let _permit = permits.acquire_owned().await.ok();
                let scored = tokio::time::timeout(score_timeout, scorer.score(&query, &text)).await;
                let result = match scored {
                    Ok(Ok(score)) if score.is_finite() => Ok(clamp_score(score)),
                    Ok(Ok(score)) => Err(ScoringError::NonNumeric(score.to_string())),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ScoringError::Timeout(score_timeout)),
                };
                (pos, result)
            });
        }

        let mut scores = vec![UNSCORED; chunk_ids.len()];
        let mut failures = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, Ok(score))) => scores[pos] = score,
                Ok((pos, Err(e))) => {
                    failures += 1;
                    warn!(
                        chunk_id = %chunk_ids[pos],
                        error = %e,
                        "relevance scoring failed for chunk, scoring as 0"
                    );
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, "relevance scoring task aborted");
                }
            }
        }

        (scores, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores by document text; `"slow"` sleeps past any sane timeout.
    struct TableScorer {
        healthy: bool,
        table: HashMap<String, Result<f32, ScoringError>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TableScorer {
        fn new(healthy: bool, table: Vec<(&str, Result<f32, ScoringError>)>) -> Arc<Self> {
            Arc::new(Self {
                healthy,
                table: table.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RelevanceScorer for TableScorer {
        async fn health_check(&self) -> bool {
            self.healthy
        }

        async fn score(&self, _query: &str, document: &str) -> Result<f32, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if document == "slow" {
                tokio::time::sleep(Duration::from_secs(600)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.table
                .get(document)
                .cloned()
                .unwrap_or(Err(ScoringError::Process("unknown document".into())))
        }
    }

    struct HangingHealthCheck;

    #[async_trait]
    impl RelevanceScorer for HangingHealthCheck {
        async fn health_check(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(600)).await;
            true
        }

        async fn score(&self, _query: &str, _document: &str) -> Result<f32, ScoringError> {
            Ok(5.0)
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Content of chunk `x` is `"x"`.
    fn identity_content(id: &str) -> Option<String> {
        Some(id.to_string())
    }

    #[tokio::test]
    async fn test_unavailable_keeps_order_without_scoring() {
        let scorer = TableScorer::new(false, vec![("x", Ok(1.0)), ("y", Ok(5.0))]);
        let reranker = Reranker::new(scorer.clone(), RerankerConfig::default());
        let out = reranker
            .rerank("q", &ids(&["x", "y", "z"]), identity_content)
            .await;
        assert_eq!(out.order, ids(&["x", "y", "z"]));
        assert_eq!(out.state, RerankerState::Unavailable);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_timeout_is_unavailable() {
        let reranker = Reranker::new(Arc::new(HangingHealthCheck), RerankerConfig::default());
        let out = reranker.rerank("q", &ids(&["a", "b"]), identity_content).await;
        assert_eq!(out.state, RerankerState::Unavailable);
        assert_eq!(out.order, ids(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_timeout_scores_zero() {
        let scorer = TableScorer::new(true, vec![("y", Ok(4.0))]);
        let reranker = Reranker::new(scorer, RerankerConfig::default());
        let content = |id: &str| Some(if id == "x" { "slow".to_string() } else { id.to_string() });
        let out = reranker.rerank("q", &ids(&["x", "y"]), content).await;
        assert_eq!(out.state, RerankerState::Ready);
        assert_eq!(out.order, ids(&["y", "x"]));
        assert_eq!(out.failures, 1);
        assert_eq!(out.scores, vec![("y".to_string(), 4.0), ("x".to_string(), 0.0)]);
    }

    #[tokio::test]
    async fn test_ties_keep_input_order() {
        let scorer = TableScorer::new(
            true,
            vec![("a", Ok(2.0)), ("b", Ok(5.0)), ("c", Ok(2.0)), ("d", Ok(5.0))],
        );
        let reranker = Reranker::new(scorer, RerankerConfig::default());
        let out = reranker
            .rerank("q", &ids(&["a", "b", "c", "d"]), identity_content)
            .await;
        assert_eq!(out.order, ids(&["b", "d", "a", "c"]));
    }

    #[tokio::test]
    async fn test_scores_are_clamped_and_junk_is_failure() {
        let scorer = TableScorer::new(
            true,
            vec![
                ("high", Ok(9.0)),
                ("low", Ok(-3.0)),
                ("nan", Ok(f32::NAN)),
                ("junk", Err(ScoringError::NonNumeric("maybe".into()))),
            ],
        );
        let reranker = Reranker::new(scorer, RerankerConfig::default());
        let out = reranker
            .rerank("q", &ids(&["junk", "low", "nan", "high"]), identity_content)
            .await;
        let scores: HashMap<String, f32> = out.scores.into_iter().collect();
        assert_eq!(scores["high"], MAX_SCORE);
        assert_eq!(scores["low"], MIN_SCORE);
        assert_eq!(scores["nan"], UNSCORED);
        assert_eq!(scores["junk"], UNSCORED);
        assert_eq!(out.failures, 2);
        assert_eq!(out.order, ids(&["high", "low", "junk", "nan"]));
    }

    #[tokio::test]
    async fn test_missing_content_skips_call() {
        let scorer = TableScorer::new(true, vec![("b", Ok(3.0))]);
        let reranker = Reranker::new(scorer.clone(), RerankerConfig::default());
        let content = |id: &str| if id == "a" { None } else { Some(id.to_string()) };
        let out = reranker.rerank("q", &ids(&["a", "b"]), content).await;
        assert_eq!(out.order, ids(&["b", "a"]));
        assert_eq!(out.failures, 1);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let docs = ["a", "b", "c", "d", "e", "f"];
        let scorer = TableScorer::new(true, docs.iter().map(|d| (*d, Ok(3.0))).collect());
        let config = RerankerConfig {
            max_concurrency: 2,
            ..RerankerConfig::default()
        };
        let reranker = Reranker::new(scorer.clone(), config);
        let out = reranker.rerank("q", &ids(&docs), identity_content).await;
        assert_eq!(out.order.len(), docs.len());
        assert!(scorer.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), docs.len());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let scorer = TableScorer::new(true, vec![]);
        let reranker = Reranker::new(scorer, RerankerConfig::default());
        let out = reranker.rerank("q", &[], identity_content).await;
        assert!(out.order.is_empty());
        assert_eq!(out.state, RerankerState::NotInitialized);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("3").unwrap(), 3.0);
        assert_eq!(parse_score("0.2").unwrap(), MIN_SCORE);
        assert!(matches!(parse_score(""), Err(ScoringError::NonNumeric(_))));
        assert!(matches!(parse_score("inf"), Err(ScoringError::NonNumeric(_))));
        assert!(matches!(parse_score("Score: 4"), Err(ScoringError::NonNumeric(_))));
    }
}
