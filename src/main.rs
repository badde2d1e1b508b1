//! # Evidence Harness CLI (`evh`)
//!
//! The `evh` binary drives the evidence pipeline: index initialization,
//! document ingestion, question answering, and evaluation.
//!
//! ## Usage
//!
//! ```bash
//! evh --config ./config/evh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `evh init` | Create the SQLite index and run schema migrations |
//! | `evh ingest` | Load, chunk, embed and index new documents |
//! | `evh reset` | Remove every chunk from the index |
//! | `evh query "<question>"` | Retrieve evidence and generate an answer |
//! | `evh evaluate` | Score retrieval and answers against ground truth |
//!
//! ## Examples
//!
//! ```bash
//! # Rebuild the index from scratch
//! evh ingest --reset
//!
//! # Ask a question with external reranking
//! evh query "When did the defect occur?" --rerank
//!
//! # Evidence only, as JSON
//! evh query "Who resolved the defect?" --no-generate --json
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG`; `--verbose` raises the default
//! level to `debug`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use evidence_harness::query::QueryOptions;
use evidence_harness::{config, evaluate, ingest, migrate, query};

/// Evidence Harness CLI: grounded question answering over a private
/// document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/evh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "evh",
    about = "Evidence Harness: retrieval, reranking and grounded answers over your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/evh.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema.
    ///
    /// Creates the SQLite database file and the chunks table. Idempotent.
    Init,

    /// Ingest documents from the configured data directory.
    ///
    /// Only chunks whose id is not already indexed are embedded and added,
    /// so re-running over unchanged data is a no-op.
    Ingest {
        /// Clear the index before ingesting.
        #[arg(long)]
        reset: bool,
    },

    /// Remove every chunk from the index.
    Reset,

    /// Answer a question from indexed evidence.
    Query {
        /// The question.
        query: String,

        /// Evidence budget (top-k per retrieval pass).
        #[arg(long)]
        k: Option<usize>,

        /// Similarity threshold for compression, in [0, 1].
        #[arg(long)]
        threshold: Option<f32>,

        /// Rerank evidence with the external relevance scorer.
        #[arg(long, conflicts_with = "no_rerank")]
        rerank: bool,

        /// Skip reranking even if enabled in config.
        #[arg(long)]
        no_rerank: bool,

        /// Print evidence only; do not call the generation model.
        #[arg(long)]
        no_generate: bool,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Evaluate the pipeline against labelled questions.
    Evaluate {
        /// Ground truth JSON file.
        #[arg(long, default_value = "./config/ground_truth.json")]
        ground_truth: PathBuf,

        /// Cut-off for recall@k.
        #[arg(long, default_value_t = 5)]
        k: usize,

        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized: {}", cfg.index.path.display());
        }
        Commands::Ingest { reset } => {
            ingest::run_ingest(&cfg, reset).await?;
        }
        Commands::Reset => {
            ingest::run_reset(&cfg).await?;
        }
        Commands::Query {
            query,
            k,
            threshold,
            rerank,
            no_rerank,
            no_generate,
            json,
        } => {
            let rerank = match (rerank, no_rerank) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let opts = QueryOptions {
                k,
                threshold,
                rerank,
                generate: !no_generate,
                json,
            };
            query::run_query(&cfg, &query, opts).await?;
        }
        Commands::Evaluate {
            ground_truth,
            k,
            json,
        } => {
            evaluate::run_evaluate(&cfg, &ground_truth, k, json).await?;
        }
    }

    Ok(())
}
