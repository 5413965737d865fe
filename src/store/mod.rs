//! Storage abstraction for the chunk store.
//!
//! The [`ChunkStore`] trait is the only way the ingestion pipeline, the
//! detector, the maintenance service and the query façade touch chunks.
//! Two backends are provided:
//!
//! - [`sqlite::SqliteStore`]: durable, WAL-mode SQLite via sqlx.
//! - [`memory::InMemoryStore`]: `RwLock`-guarded, for tests and embedding.
//!
//! # Consistency
//!
//! Readers never observe a half-written chunk: a row is inserted whole or
//! not at all, and [`insert_chunks`](ChunkStore::insert_chunks) commits a
//! whole document in one step. Nothing else is isolated. A scan may run
//! alongside an insert or a delete and see either side of it.
//!
//! [`delete`](ChunkStore::delete) is idempotent per id, so overlapping
//! cleanup passes need no coordination.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkRecord, NewChunk};

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Write every chunk of one document, or none of them.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()>;

    /// Write a single record exactly as given, including absent fields.
    ///
    /// Used by repair tooling and tests to place rows the pipeline would
    /// never produce.
    async fn insert_record(&self, record: &ChunkRecord) -> Result<()>;

    /// Every chunk, ordered by `created_at` then `id`.
    async fn scan(&self) -> Result<Vec<ChunkRecord>>;

    /// Delete one chunk. Returns `true` iff a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    /// Distinct non-empty document ids, sorted.
    async fn document_ids(&self) -> Result<Vec<String>>;

    /// Up to `limit` chunk ids in scan order.
    async fn chunk_ids(&self, limit: usize) -> Result<Vec<String>>;
}
