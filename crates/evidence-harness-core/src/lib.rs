//! # Evidence Harness Core
//!
//! The retrieval-and-ranking pipeline behind Evidence Harness: chunk
//! identity, ingestion deduplication, dual-strategy retrieval, similarity
//! compression, intersection fusion, and external reranking.
//!
//! This crate has no database, HTTP, or filesystem dependencies. Every
//! external collaborator (vector index, embedding model, relevance scorer)
//! is reached through a trait, so the application can plug in SQLite and
//! Ollama while tests plug in fakes.
//!
//! ## Query Flow
//!
//! ```text
//! query ──▶ DualRetriever ──┬─ context pass ─▶ context_ids ─┐
//!                           └─ query pass ───▶ query_ids ───┤
//!                                  │                        ▼
//!                                  └▶ SimilarityCompressor ─▶ fuse ─▶ Reranker ─▶ evidence
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, chunks, evidence items |
//! | [`chunk_id`] | Deterministic `source:index` chunk identifiers |
//! | [`chunk`] | Recursive-separator text splitter |
//! | [`dedup`] | Ingestion addition planning |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) trait and vector utilities |
//! | [`index`] | [`VectorIndex`](index::VectorIndex) trait and in-memory index |
//! | [`retrieve`] | Dual retriever and retrieval strategies |
//! | [`compress`] | Similarity-threshold compressor |
//! | [`fusion`] | Intersection fusion policy |
//! | [`rerank`] | External relevance reranker |
//! | [`pipeline`] | Query and ingestion entry points |
//! | [`prompt`] | Few-shot prompt assembly |
//! | [`eval`] | Retrieval and answer quality metrics |

pub mod chunk;
pub mod chunk_id;
pub mod compress;
pub mod dedup;
pub mod embedding;
pub mod eval;
pub mod fusion;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod rerank;
pub mod retrieve;
