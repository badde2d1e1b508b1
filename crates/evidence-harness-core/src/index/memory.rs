//! In-memory [`VectorIndex`] implementation for tests and small corpora.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Search is brute-force over all stored vectors.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::Chunk;

use super::{rank_candidates, DistanceMetric, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().unwrap();
        Ok(rank_candidates(
            query_vec,
            stored.iter().map(|s| (&s.chunk, s.vector.as_slice())),
            k,
            metric,
        ))
    }

    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let stored = self.chunks.read().unwrap();
        Ok(stored.iter().map(|s| s.chunk.id.clone()).collect())
    }

    async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let mut stored = self.chunks.write().unwrap();
        let mut present: HashSet<String> = stored.iter().map(|s| s.chunk.id.clone()).collect();
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            if present.insert(chunk.id.clone()) {
                stored.push(StoredChunk {
                    chunk: chunk.clone(),
                    vector: vector.clone(),
                });
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let stored = self.chunks.read().unwrap();
        Ok(stored.iter().find(|s| s.chunk.id == id).map(|s| s.chunk.clone()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().unwrap().len())
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.write().unwrap().clear();
        Ok(())
    }
}
