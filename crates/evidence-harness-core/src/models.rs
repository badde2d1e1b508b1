//! Core data models used throughout Evidence Harness.
//!
//! These types represent the documents, chunks, and evidence items that
//! flow through the ingestion and retrieval pipeline.

use serde::Serialize;

use crate::chunk_id::identify;

/// A source document after text extraction and cleaning.
///
/// `source_id` is the stable path or name of the source file and is the
/// first half of every chunk identifier derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

/// A contiguous span of text belonging to exactly one [`Document`].
///
/// The identifier is fully determined by `(source_id, sequence_index)`;
/// content never influences it. Construct through [`Chunk::new`] so the
/// identifier is always stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// `"{source_id}:{sequence_index}"`, see [`identify`].
    pub id: String,
    /// Owning document identifier.
    pub source_id: String,
    /// 0-based position among chunks from the same source.
    pub sequence_index: usize,
    /// Extracted text.
    pub content: String,
}

impl Chunk {
    pub fn new(
        source_id: impl Into<String>,
        sequence_index: usize,
        content: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            id: identify(&source_id, sequence_index),
            source_id,
            sequence_index,
            content: content.into(),
        }
    }
}

/// One entry of an evidence set: a chunk reference plus its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceItem {
    pub chunk_id: String,
    pub content: String,
}

impl From<Chunk> for EvidenceItem {
    fn from(chunk: Chunk) -> Self {
        Self {
            chunk_id: chunk.id,
            content: chunk.content,
        }
    }
}
