//! Answer generation.
//!
//! [`Generator`] is the seam between the evidence pipeline and the
//! language model; [`OllamaGenerator`] is the stock implementation over
//! Ollama's `POST /api/generate` endpoint with streaming disabled.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::GenerationConfig;

/// Produces a completion for a fully rendered prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A generated answer and the evidence it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub response: String,
    /// Chunk ids in evidence order.
    pub sources: Vec<String>,
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        ollama_generate(&self.client, &self.url, &self.model, prompt)
            .await
            .with_context(|| format!("generation with '{}' failed", self.model))
    }
}

/// One non-streaming completion from Ollama.
pub(crate) async fn ollama_generate(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    prompt: &str,
) -> Result<String> {
    let endpoint = format!("{}/api/generate", url.trim_end_matches('/'));
    let body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
    });

    let response = client
        .post(&endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| anyhow!("Ollama connection error (is Ollama running at {}?): {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Ollama API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    parse_generate_response(&json)
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_response() {
        let json = serde_json::json!({ "model": "phi3.5", "response": "It failed on 01/01/2024.", "done": true });
        assert_eq!(parse_generate_response(&json).unwrap(), "It failed on 01/01/2024.");
    }

    #[test]
    fn test_parse_generate_response_missing_field() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_generate_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_errors() {
        let config = GenerationConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..GenerationConfig::default()
        };
        let generator = OllamaGenerator::new(&config).unwrap();
        assert!(generator.generate("hello").await.is_err());
    }
}
