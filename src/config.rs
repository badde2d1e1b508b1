//! TOML configuration.
//!
//! Every section except `[index]` is optional and falls back to defaults,
//! so the smallest valid config is:
//!
//! ```toml
//! [index]
//! path = "./data/evh.sqlite"
//! ```
//!
//! [`load_config`] parses and validates; nothing downstream re-checks the
//! invariants enforced here.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use evidence_harness_core::compress::DEFAULT_SIMILARITY_THRESHOLD;
use evidence_harness_core::retrieve::PassConfig;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Per-chunk scoring timeouts above this are accepted but logged.
pub const SCORE_TIMEOUT_WARN_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Section headings used to restructure extracted text; see
    /// [`structure_sections`](crate::extract::structure_sections).
    #[serde(default)]
    pub section_markers: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            section_markers: Vec::new(),
        }
    }
}

fn default_chunk_size() -> usize {
    600
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Bound on each retrieval pass and on compression. Raised at query time
    /// to [`EmbeddingConfig::retry_budget`] when that is longer, since both
    /// embed the query.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub context_pass: PassConfig,
    #[serde(default)]
    pub query_pass: PassConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            similarity_threshold: default_similarity_threshold(),
            timeout_secs: default_timeout_secs(),
            context_pass: PassConfig::default(),
            query_pass: PassConfig::default(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Provider base URL. Ollama defaults to [`DEFAULT_OLLAMA_URL`],
    /// OpenAI to `https://api.openai.com`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Worst-case wall time of one embedding request: every attempt runs to
    /// the client timeout, plus the backoff sleeps between attempts.
    pub fn retry_budget(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let backoff: u64 = (1..=self.max_retries)
            .map(|attempt| 1u64 << (attempt - 1).min(5))
            .sum();
        Duration::from_secs(self.timeout_secs * attempts + backoff)
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    /// Executable used by the `ollama-cli` provider.
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub score_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_rerank_provider(),
            model: default_generation_model(),
            url: default_ollama_url(),
            binary: default_binary(),
            health_timeout_secs: default_health_timeout_secs(),
            score_timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_rerank_provider() -> String {
    "ollama-cli".to_string()
}
fn default_binary() -> String {
    "ollama".to_string()
}
fn default_health_timeout_secs() -> u64 {
    10
}
fn default_max_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_generation_model(),
            url: default_ollama_url(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_generation_model() -> String {
    "phi3.5".to_string()
}
fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    if config.retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }
    for (name, pass) in [
        ("context_pass", &config.retrieval.context_pass),
        ("query_pass", &config.retrieval.query_pass),
    ] {
        if pass.k == Some(0) {
            bail!("retrieval.{}.k must be >= 1", name);
        }
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.timeout_secs == 0 {
        bail!("retrieval.timeout_secs must be > 0");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    // Rerank
    match config.rerank.provider.as_str() {
        "ollama-cli" | "ollama-http" => {}
        other => bail!(
            "Unknown rerank provider: '{}'. Must be ollama-cli or ollama-http.",
            other
        ),
    }
    if config.rerank.max_concurrency < 1 {
        bail!("rerank.max_concurrency must be >= 1");
    }
    if config.rerank.health_timeout_secs == 0 {
        bail!("rerank.health_timeout_secs must be > 0");
    }
    if config.rerank.score_timeout_secs == 0 {
        bail!("rerank.score_timeout_secs must be > 0");
    }
    if config.rerank.score_timeout_secs > SCORE_TIMEOUT_WARN_SECS {
        warn!(
            score_timeout_secs = config.rerank.score_timeout_secs,
            "rerank.score_timeout_secs above {}s; one slow chunk can stall the query that long",
            SCORE_TIMEOUT_WARN_SECS
        );
    }

    // Generation
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidence_harness_core::index::DistanceMetric;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[index]\npath = \"./evh.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 600);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.retrieval.similarity_threshold, 0.75);
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert!(!config.rerank.enabled);
        assert_eq!(config.rerank.max_concurrency, 1);
        assert!(config.generation.enabled);
        assert_eq!(config.generation.model, "phi3.5");
    }

    #[test]
    fn test_pass_configs_parse() {
        let config = parse(
            r#"
[index]
path = "x.sqlite"

[retrieval.context_pass]
k = 8
metric = "dot_product"

[retrieval.query_pass]
metric = "euclidean"
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.context_pass.k, Some(8));
        assert_eq!(config.retrieval.context_pass.metric, DistanceMetric::DotProduct);
        assert_eq!(config.retrieval.query_pass.k, None);
        assert_eq!(config.retrieval.query_pass.metric, DistanceMetric::Euclidean);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse("[index]\npath = \"x\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = parse("[index]\npath = \"x\"\n[retrieval]\nsimilarity_threshold = 1.2\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[index]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[index]\npath = \"x\"\n[rerank]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(parse("[index]\npath = \"x\"\n[rerank]\nmax_concurrency = 0\n").is_err());
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let src = "[index]\npath = \"x\"\n[retrieval.query_pass]\nmetric = \"manhattan\"\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for section in [
            "[rerank]\nscore_timeout_secs = 0",
            "[rerank]\nhealth_timeout_secs = 0",
            "[embedding]\ntimeout_secs = 0",
            "[generation]\ntimeout_secs = 0",
        ] {
            let src = format!("[index]\npath = \"x\"\n{}\n", section);
            assert!(parse(&src).is_err(), "accepted: {}", section);
        }
    }

    #[test]
    fn test_long_score_timeout_allowed() {
        let config = parse("[index]\npath = \"x\"\n[rerank]\nscore_timeout_secs = 90\n").unwrap();
        assert_eq!(config.rerank.score_timeout_secs, 90);
    }

    #[test]
    fn test_embedding_retry_budget() {
        let config = parse("[index]\npath = \"x\"\n").unwrap();
        // 4 attempts of 30s plus 1 + 2 + 4 seconds of backoff.
        assert_eq!(config.embedding.retry_budget(), Duration::from_secs(127));

        let src = "[index]\npath = \"x\"\n[embedding]\nmax_retries = 0\ntimeout_secs = 5\n";
        let config = parse(src).unwrap();
        assert_eq!(config.embedding.retry_budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse(include_str!("../config/evh.example.toml")).unwrap();
        assert_eq!(config.chunking.section_markers.len(), 2);
        assert_eq!(config.generation.timeout_secs, 120);
    }
}
