//! Ollama-backed relevance scorers.
//!
//! Two ways of reaching the same model:
//! - **[`OllamaCliScorer`]** runs `{binary} run {model} "{prompt}"` as a
//!   subprocess, one process per call.
//! - **[`OllamaHttpScorer`]** posts the prompt to `/api/generate`.
//!
//! Both ask for a bare 1–5 number and hand the reply to
//! [`parse_score`]. Timeouts are applied by the
//! [`Reranker`](evidence_harness_core::rerank::Reranker); the subprocess is
//! spawned with `kill_on_drop`, so a timed-out call also ends the child.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use evidence_harness_core::rerank::{parse_score, RelevanceScorer, ScoringError};

use crate::config::RerankConfig;
use crate::generate::ollama_generate;

const HEALTH_PROMPT: &str = "Test relevance scoring.";

/// Prompt asking for a single relevance number.
pub fn scoring_prompt(query: &str, document: &str) -> String {
    format!(
        "Rate the relevance of the following document to the query on a scale of 1 to 5. \
         Reply with the number only.\n\nQuery: {}\n\nDocument: {}\n\nScore:",
        query, document
    )
}

/// Build the scorer named by `config.provider`.
pub fn create_scorer(config: &RerankConfig) -> Result<Arc<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "ollama-cli" => Ok(Arc::new(OllamaCliScorer::new(&config.binary, &config.model))),
        "ollama-http" => Ok(Arc::new(OllamaHttpScorer::new(&config.url, &config.model))),
        other => bail!("Unknown rerank provider: {}", other),
    }
}

// ============ Subprocess ============

pub struct OllamaCliScorer {
    binary: String,
    model: String,
}

impl OllamaCliScorer {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
        }
    }

    /// Run the model once and return stdout, or a `Process` error.
    async fn run(&self, prompt: &str) -> Result<String, ScoringError> {
        let output = Command::new(&self.binary)
            .arg("run")
            .arg(&self.model)
            .arg(prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScoringError::Process(format!("failed to spawn {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoringError::Process(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RelevanceScorer for OllamaCliScorer {
    async fn health_check(&self) -> bool {
        match self.run(HEALTH_PROMPT).await {
            Ok(_) => true,
            Err(e) => {
                debug!(model = %self.model, error = %e, "ollama cli health check failed");
                false
            }
        }
    }

    async fn score(&self, query: &str, document: &str) -> Result<f32, ScoringError> {
        let stdout = self.run(&scoring_prompt(query, document)).await?;
        parse_score(&stdout)
    }
}

// ============ HTTP ============

pub struct OllamaHttpScorer {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaHttpScorer {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl RelevanceScorer for OllamaHttpScorer {
    async fn health_check(&self) -> bool {
        let endpoint = format!("{}/api/tags", self.url.trim_end_matches('/'));
        match self.client.get(&endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "ollama http health check failed");
                false
            }
        }
    }

    async fn score(&self, query: &str, document: &str) -> Result<f32, ScoringError> {
        let prompt = scoring_prompt(query, document);
        let reply = ollama_generate(&self.client, &self.url, &self.model, &prompt)
            .await
            .map_err(|e| ScoringError::Http(format!("{:#}", e)))?;
        parse_score(&reply)
    }
}
