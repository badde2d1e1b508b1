//! `evh query`: evidence retrieval plus answer generation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use evidence_harness_core::compress::SimilarityCompressor;
use evidence_harness_core::embedding::Embedder;
use evidence_harness_core::index::VectorIndex;
use evidence_harness_core::models::EvidenceItem;
use evidence_harness_core::pipeline::{EvidencePipeline, QueryResult};
use evidence_harness_core::prompt::build_prompt;
use evidence_harness_core::rerank::{RerankOutcome, Reranker, RerankerConfig};
use evidence_harness_core::retrieve::DualRetriever;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::{Answer, Generator, OllamaGenerator};
use crate::scoring::create_scorer;
use crate::sqlite_index::SqliteIndex;

/// Command-line overrides for a single query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub k: Option<usize>,
    pub threshold: Option<f32>,
    /// `Some(true)` forces reranking on, `Some(false)` off.
    pub rerank: Option<bool>,
    pub generate: bool,
    pub json: bool,
}

/// Assemble the evidence pipeline from configuration plus overrides.
pub fn build_pipeline(
    config: &Config,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    opts: &QueryOptions,
) -> Result<EvidencePipeline> {
    let retrieval = &config.retrieval;
    let timeout = retrieval_timeout(config);

    let retriever = DualRetriever::over_index(
        index,
        embedder.clone(),
        retrieval.context_pass.clone(),
        retrieval.query_pass.clone(),
        timeout,
    );
    let compressor = SimilarityCompressor::new(embedder, timeout)
        .with_threshold(opts.threshold.unwrap_or(retrieval.similarity_threshold))?;

    let k = opts.k.unwrap_or(retrieval.k);
    let mut pipeline = EvidencePipeline::new(retriever, compressor, k);

    if opts.rerank.unwrap_or(config.rerank.enabled) {
        let rerank = &config.rerank;
        let reranker = Reranker::new(
            create_scorer(rerank)?,
            RerankerConfig {
                health_timeout: Duration::from_secs(rerank.health_timeout_secs),
                score_timeout: Duration::from_secs(rerank.score_timeout_secs),
                max_concurrency: rerank.max_concurrency,
            },
        );
        pipeline = pipeline.with_reranker(reranker);
    }

    Ok(pipeline)
}

/// Timeout for each retrieval pass and for compression.
///
/// Never shorter than the embedder's retry budget, so a transient embedding
/// failure gets its retries before the query gives up.
pub fn retrieval_timeout(config: &Config) -> Duration {
    let configured = Duration::from_secs(config.retrieval.timeout_secs);
    let budget = config.embedding.retry_budget();
    if budget > configured {
        debug!(?configured, ?budget, "retrieval timeout raised to embedding retry budget");
        budget
    } else {
        configured
    }
}

/// Run the pipeline and, when a generator is given, answer from the evidence.
pub async fn answer(
    pipeline: &EvidencePipeline,
    generator: Option<&dyn Generator>,
    query: &str,
) -> Result<(QueryResult, Option<Answer>)> {
    let result = pipeline.query(query).await?;

    let answer = match generator {
        Some(generator) => {
            let prompt = build_prompt(query, &result.evidence);
            let response = generator.generate(&prompt).await?;
            Some(Answer {
                query: query.to_string(),
                response: response.trim().to_string(),
                sources: result.sources(),
            })
        }
        None => None,
    };

    Ok((result, answer))
}

#[derive(Serialize)]
struct QueryReport<'a> {
    query: &'a str,
    k: usize,
    threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a str>,
    sources: Vec<String>,
    evidence: &'a [EvidenceItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    rerank: Option<&'a RerankOutcome>,
}

pub async fn run_query(config: &Config, query: &str, opts: QueryOptions) -> Result<()> {
    let index = Arc::new(SqliteIndex::open(config).await?);
    let embedder = create_embedder(&config.embedding)?;
    let pipeline = build_pipeline(config, index.clone(), embedder, &opts)?;

    let generator = if opts.generate && config.generation.enabled {
        Some(OllamaGenerator::new(&config.generation)?)
    } else {
        None
    };

    let (result, answer) = answer(
        &pipeline,
        generator.as_ref().map(|g| g as &dyn Generator),
        query,
    )
    .await?;

    if let Some(outcome) = &result.rerank {
        if outcome.failures > 0 {
            warn!(failures = outcome.failures, "some evidence could not be scored");
        }
    }

    if opts.json {
        let report = QueryReport {
            query,
            k: result.k,
            threshold: result.threshold,
            response: answer.as_ref().map(|a| a.response.as_str()),
            sources: result.sources(),
            evidence: &result.evidence,
            rerank: result.rerank.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(answer) = &answer {
        println!("Response: {}", answer.response);
        println!("Sources: {:?}", answer.sources);
    } else if result.evidence.is_empty() {
        println!("No evidence found.");
    } else {
        println!("Evidence (k={}, threshold={:.2}):", result.k, result.threshold);
        for (i, item) in result.evidence.iter().enumerate() {
            println!("{}. {}", i + 1, item.chunk_id);
            println!("    {}", snippet(&item.content, 200));
        }
    }

    index.pool().close().await;
    Ok(())
}

/// First `max_chars` characters, with an ellipsis when cut.
fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
