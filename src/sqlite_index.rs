//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks and their embeddings share one `chunks` table (see
//! [`migrate`](crate::migrate)). Vectors are stored as little-endian `f32`
//! blobs and searched by brute force, which is fine for the corpus sizes a
//! single-user evidence index holds.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use evidence_harness_core::embedding::{blob_to_vec, vec_to_blob};
use evidence_harness_core::index::{rank_candidates, DistanceMetric, VectorIndex};
use evidence_harness_core::models::Chunk;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    model: String,
}

impl SqliteIndex {
    /// Connect to the configured index, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool).with_model(config.embedding.model.clone()))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            model: "unknown".to_string(),
        }
    }

    /// Record `model` as the embedding model on rows this index writes.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let sequence_index: i64 = row.get("sequence_index");
    Chunk {
        id: row.get("id"),
        source_id: row.get("source_id"),
        sequence_index: sequence_index as usize,
        content: row.get("content"),
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, source_id, sequence_index, content, embedding FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let stored: Vec<(Chunk, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (chunk_from_row(row), blob_to_vec(&blob))
            })
            .collect();

        Ok(rank_candidates(
            query_vec,
            stored.iter().map(|(chunk, vec)| (chunk, vec.as_slice())),
            k,
            metric,
        ))
    }

    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, sequence_index, content, embedding, dims, model, ingested_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.sequence_index as i64)
            .bind(&chunk.content)
            .bind(vec_to_blob(vector))
            .bind(vector.len() as i64)
            .bind(&self.model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, source_id, sequence_index, content FROM chunks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(chunk_from_row))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }
}
