//! # Evidence Harness
//!
//! Grounded question answering over a private document corpus.
//!
//! This crate is the application layer around
//! [`evidence_harness_core`]: it loads documents from disk, keeps chunks
//! and embeddings in SQLite, talks to Ollama (or OpenAI) for embeddings,
//! relevance scores and answers, and exposes it all through the `evh` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  loader  │──▶│    ingest    │──▶│ SqliteIndex  │
//! │ PDF/text │   │ chunk+dedup  │   │ chunks+vecs  │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                     ┌────────────────────┘
//!                     ▼
//!              ┌──────────────┐   ┌──────────────┐
//!              │    query     │──▶│  generate    │
//!              │ retrieve→    │   │ few-shot     │
//!              │ compress→    │   │ prompt       │
//!              │ fuse→rerank  │   └──────────────┘
//!              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! evh init                               # create the index
//! evh ingest                             # index ./data
//! evh query "When did the defect occur?"
//! evh evaluate --ground-truth gt.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_index`] | SQLite [`VectorIndex`](evidence_harness_core::index::VectorIndex) |
//! | [`embedding`] | Ollama / OpenAI embedders |
//! | [`scoring`] | Ollama relevance scorers (subprocess and HTTP) |
//! | [`generate`] | Answer generation |
//! | [`extract`] | PDF extraction, text cleaning, section structuring |
//! | [`loader`] | Filesystem document loader |
//! | [`ingest`] | Ingestion and reset commands |
//! | [`query`] | Query command and pipeline assembly |
//! | [`evaluate`] | Evaluation command |

pub mod config;
pub mod db;
pub mod embedding;
pub mod evaluate;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod query;
pub mod scoring;
pub mod sqlite_index;
