//! Ingestion orchestration.
//!
//! Coordinates the full flow: loader → splitting → chunk identity →
//! addition planning → embedding → index. Re-running over unchanged data
//! adds nothing: every chunk id is already present and is skipped.

use anyhow::{bail, Context, Result};
use tracing::info;

use evidence_harness_core::chunk::chunk_documents;
use evidence_harness_core::embedding::Embedder;
use evidence_harness_core::index::VectorIndex;
use evidence_harness_core::models::Document;
use evidence_harness_core::pipeline::EvidencePipeline;

use crate::config::{ChunkingConfig, Config};
use crate::embedding::create_embedder;
use crate::loader;
use crate::sqlite_index::SqliteIndex;

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks in the index before this run.
    pub existing: usize,
    pub added: usize,
    /// Chunks whose id was already indexed.
    pub skipped: usize,
}

/// Chunk, plan, embed and add `documents`.
///
/// Additions are embedded and committed `batch_size` chunks at a time, so
/// an interrupted run keeps what it already wrote and the next run picks up
/// the remainder.
pub async fn ingest_documents(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    documents: &[Document],
    chunking: &ChunkingConfig,
    batch_size: usize,
) -> Result<IngestReport> {
    let chunks = chunk_documents(documents, chunking.chunk_size, chunking.chunk_overlap);
    let chunk_count = chunks.len();

    let existing = index.existing_ids().await?;
    let plan = EvidencePipeline::plan_ingestion(chunks, &existing);

    for batch in plan.additions.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts).await.with_context(|| {
            format!("Failed to embed new chunks with '{}'", embedder.model_name())
        })?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        index.add(batch, &vectors).await?;
    }

    let report = IngestReport {
        documents: documents.len(),
        chunks: chunk_count,
        existing: existing.len(),
        added: plan.additions.len(),
        skipped: plan.skipped,
    };
    info!(
        documents = report.documents,
        added = report.added,
        skipped = report.skipped,
        "ingestion complete"
    );
    Ok(report)
}

/// `evh ingest`: load `data.root` into the configured index.
pub async fn run_ingest(config: &Config, reset: bool) -> Result<()> {
    let index = SqliteIndex::open(config).await?;

    if reset {
        index.clear().await?;
        println!("Cleared index: {}", config.index.path.display());
    }

    let scan = loader::scan_documents(config)?;
    let embedder = create_embedder(&config.embedding)?;

    let report = ingest_documents(
        &index,
        embedder.as_ref(),
        &scan.documents,
        &config.chunking,
        config.embedding.batch_size,
    )
    .await?;

    println!("ingest {}", config.data.root.display());
    println!("  documents loaded: {}", report.documents);
    if !scan.skipped.is_empty() {
        println!("  files skipped: {}", scan.skipped.len());
    }
    println!("  chunks: {}", report.chunks);
    println!("  existing chunks in index: {}", report.existing);
    if report.added > 0 {
        println!("  Adding new chunks: {}", report.added);
    } else {
        println!("  No new chunks to add");
    }
    println!("  skipped (already indexed): {}", report.skipped);
    println!("ok");

    index.pool().close().await;
    Ok(())
}

/// `evh reset`: remove every chunk from the index.
pub async fn run_reset(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(config).await?;
    let removed = index.count().await?;
    index.clear().await?;
    println!("Cleared index: {} ({} chunks removed)", config.index.path.display(), removed);
    index.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evidence_harness_core::index::memory::InMemoryIndex;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document {
                source_id: "data/a.txt".into(),
                text: "alpha ".repeat(30),
            },
            Document {
                source_id: "data/b.txt".into(),
                text: "short".into(),
            },
        ]
    }

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 60,
            chunk_overlap: 10,
            section_markers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_second_run_adds_nothing() {
        let index = InMemoryIndex::new();
        let first = ingest_documents(&index, &LengthEmbedder, &docs(), &chunking(), 2)
            .await
            .unwrap();
        assert!(first.added > 1);
        assert_eq!(first.skipped, 0);
        assert_eq!(index.count().await.unwrap(), first.added);

        let second = ingest_documents(&index, &LengthEmbedder, &docs(), &chunking(), 2)
            .await
            .unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, first.chunks);
        assert_eq!(second.existing, first.added);
    }

    #[tokio::test]
    async fn test_new_document_only_adds_its_chunks() {
        let index = InMemoryIndex::new();
        ingest_documents(&index, &LengthEmbedder, &docs(), &chunking(), 8)
            .await
            .unwrap();

        let mut more = docs();
        more.push(Document {
            source_id: "data/c.txt".into(),
            text: "fresh".into(),
        });
        let report = ingest_documents(&index, &LengthEmbedder, &more, &chunking(), 8)
            .await
            .unwrap();
        assert_eq!(report.added, 1);
        assert!(index.get("data/c.txt:0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reingest_through_other_root_spelling_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.txt"), "Radar magnetron failed.").unwrap();

        let mut config: Config = toml::from_str("[index]\npath = \"unused.sqlite\"\n").unwrap();
        let index = InMemoryIndex::new();

        config.data.root = dir.path().to_path_buf();
        let first = loader::scan_documents(&config).unwrap();
        let r1 = ingest_documents(&index, &LengthEmbedder, &first.documents, &chunking(), 8)
            .await
            .unwrap();
        assert_eq!(r1.added, 1);

        config.data.root = dir.path().join(".");
        let second = loader::scan_documents(&config).unwrap();
        let r2 = ingest_documents(&index, &LengthEmbedder, &second.documents, &chunking(), 8)
            .await
            .unwrap();
        assert_eq!(r2.added, 0);
        assert_eq!(r2.skipped, 1);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.get("report.txt:0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disabled_embedder_fails_only_with_additions() {
        let index = InMemoryIndex::new();
        let disabled = crate::embedding::DisabledEmbedder;
        assert!(ingest_documents(&index, &disabled, &docs(), &chunking(), 8)
            .await
            .is_err());

        let empty = ingest_documents(&index, &disabled, &[], &chunking(), 8)
            .await
            .unwrap();
        assert_eq!(empty.added, 0);
    }
}
