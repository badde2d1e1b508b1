//! `evh evaluate`: score the pipeline against labelled questions.
//!
//! Ground truth is a JSON array of
//! `{ "query", "answer", "relevant_doc_ids" }` objects. A case that fails
//! (retrieval or generation error) is reported and left out of the
//! averages.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

use evidence_harness_core::eval::{score_case, EvaluationSummary, GroundTruthCase};
use evidence_harness_core::pipeline::EvidencePipeline;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::{Generator, OllamaGenerator};
use crate::query::{answer, build_pipeline, QueryOptions};
use crate::sqlite_index::SqliteIndex;

pub fn load_ground_truth(path: &Path) -> Result<Vec<GroundTruthCase>> {
    if !path.exists() {
        bail!("Ground truth file not found: {}", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ground truth: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ground truth: {}", path.display()))
}

/// Evaluate every case, printing per-case results as it goes.
pub async fn evaluate_cases(
    pipeline: &EvidencePipeline,
    generator: Option<&dyn Generator>,
    cases: &[GroundTruthCase],
    k: usize,
) -> EvaluationSummary {
    let mut scores = Vec::with_capacity(cases.len());
    let mut failed = 0usize;

    println!("Evaluating {} queries", cases.len());
    for (i, case) in cases.iter().enumerate() {
        println!();
        println!("[{}/{}] {}", i + 1, cases.len(), case.query);

        match answer(pipeline, generator, &case.query).await {
            Ok((result, generated)) => {
                let sources = result.sources();
                let response = generated.map(|a| a.response).unwrap_or_default();
                let score = score_case(case, &sources, &response, k);

                if generator.is_some() {
                    println!("  answer: {}", response);
                }
                println!("  sources: {:?}", sources);
                println!("  recall@{}: {:.2}", k, score.recall_at_k);
                println!("  average precision: {:.2}", score.average_precision);
                println!("  exact match: {}", if score.exact_match { "yes" } else { "no" });
                scores.push(score);
            }
            Err(e) => {
                warn!(query = %case.query, error = %format!("{:#}", e), "evaluation case failed");
                println!("  error: {:#}", e);
                failed += 1;
            }
        }
    }

    EvaluationSummary::from_cases(k, scores, failed)
}

pub async fn run_evaluate(
    config: &Config,
    ground_truth: &Path,
    k: usize,
    json: bool,
) -> Result<()> {
    let cases = load_ground_truth(ground_truth)?;

    let index = Arc::new(SqliteIndex::open(config).await?);
    let embedder = create_embedder(&config.embedding)?;
    let pipeline = build_pipeline(config, index.clone(), embedder, &QueryOptions::default())?;

    let generator = if config.generation.enabled {
        Some(OllamaGenerator::new(&config.generation)?)
    } else {
        None
    };

    let summary = evaluate_cases(
        &pipeline,
        generator.as_ref().map(|g| g as &dyn Generator),
        &cases,
        k,
    )
    .await;

    println!();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Evaluation results ({} cases, {} failed)", summary.cases.len(), summary.failed);
        println!("  mean recall@{}: {:.2}", summary.k, summary.mean_recall_at_k);
        println!("  mean average precision: {:.2}", summary.mean_average_precision);
        println!("  exact match rate: {:.2}", summary.exact_match_rate);
    }

    index.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gt.json");
        std::fs::write(
            &path,
            r#"[{"query": "What is the name of the ship?", "answer": "INS Cheetah", "relevant_doc_ids": ["report.pdf:0"]}]"#,
        )
        .unwrap();
        let cases = load_ground_truth(&path).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].answer, "INS Cheetah");
    }

    #[test]
    fn test_example_ground_truth_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/ground_truth.example.json");
        let cases = load_ground_truth(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].relevant_doc_ids.len(), 2);
        // Ids are relative to `data.root`, matching what the loader produces.
        assert_eq!(cases[0].relevant_doc_ids, vec!["report-001.pdf:0"]);
    }

    #[test]
    fn test_missing_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_ground_truth(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
