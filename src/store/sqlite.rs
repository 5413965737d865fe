//! SQLite-backed [`ChunkStore`] implementation.
//!
//! One table, `chunks`, created by [`crate::migrate`]. Embeddings are stored
//! as little-endian `f32` BLOBs; a BLOB that does not decode is surfaced as
//! [`IndexKey::Undecodable`] rather than dropped, so the detector can see it.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{KbError, Result};
use crate::migrate;
use crate::models::{ChunkRecord, IndexKey, NewChunk};

use super::ChunkStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config.db).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }
}

fn row_to_record(row: &SqliteRow) -> ChunkRecord {
    let blob: Option<Vec<u8>> = row.get("embedding");
    let index_key = blob.map(|b| match blob_to_vec(&b) {
        Some(v) => IndexKey::Dense(v),
        None => IndexKey::Undecodable { bytes: b.len() },
    });

    ChunkRecord {
        id: row.get("id"),
        doc_id: row.get("doc_id"),
        text: row.get("text"),
        index_key,
        created_at: row.get("created_at"),
    }
}

fn key_to_blob(key: &IndexKey) -> Vec<u8> {
    match key {
        IndexKey::Dense(v) => vec_to_blob(v),
        // Reproduce an undecodable key with the same byte length.
        IndexKey::Undecodable { bytes } => vec![0u8; *bytes],
    }
}

fn ensure_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(KbError::Storage("chunk id must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        for chunk in chunks {
            ensure_id(&chunk.id)?;
        }
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, doc_id, text, embedding, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.doc_id)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_record(&self, record: &ChunkRecord) -> Result<()> {
        ensure_id(&record.id)?;
        sqlx::query(
            "INSERT INTO chunks (id, doc_id, text, embedding, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.doc_id)
        .bind(&record.text)
        .bind(record.index_key.as_ref().map(key_to_blob))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, doc_id, text, embedding, created_at FROM chunks ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT doc_id FROM chunks \
             WHERE doc_id IS NOT NULL AND doc_id != '' ORDER BY doc_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn chunk_ids(&self, limit: usize) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks ORDER BY created_at, id LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}
