//! In-memory [`ChunkStore`] implementation.
//!
//! A `Vec` behind `std::sync::RwLock`. Every method takes the lock once, so
//! each call is atomic with respect to the others.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{KbError, Result};
use crate::models::{ChunkRecord, NewChunk};

use super::ChunkStore;

pub struct InMemoryStore {
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.chunks
            .read()
            .map_err(|_| KbError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.chunks
            .write()
            .map_err(|_| KbError::Storage("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_unique<'a>(
    existing: &[ChunkRecord],
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let mut seen: BTreeSet<&str> = existing.iter().map(|c| c.id.as_str()).collect();
    for id in ids {
        if id.is_empty() {
            return Err(KbError::Storage("chunk id must not be empty".to_string()));
        }
        if !seen.insert(id) {
            return Err(KbError::Storage(format!("duplicate chunk id: {}", id)));
        }
    }
    Ok(())
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        let mut stored = self.write()?;
        ensure_unique(&stored, chunks.iter().map(|c| c.id.as_str()))?;
        stored.extend(chunks.iter().cloned().map(ChunkRecord::from));
        Ok(())
    }

    async fn insert_record(&self, record: &ChunkRecord) -> Result<()> {
        let mut stored = self.write()?;
        ensure_unique(&stored, [record.id.as_str()])?;
        stored.push(record.clone());
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ChunkRecord>> {
        let mut all = self.read()?.clone();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|c| c.id != id);
        Ok(stored.len() < before)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self
            .read()?
            .iter()
            .filter_map(|c| c.doc_id.clone())
            .filter(|d| !d.is_empty())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn chunk_ids(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .take(limit)
            .map(|c| c.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexKey;

    fn new_chunk(id: &str, doc: &str, ts: i64) -> NewChunk {
        NewChunk {
            id: id.to_string(),
            doc_id: doc.to_string(),
            text: format!("text of {}", id),
            embedding: vec![1.0, 0.0],
            created_at: ts,
        }
    }

    #[tokio::test]
    async fn duplicate_id_rejects_whole_batch() {
        let store = InMemoryStore::new();
        store.insert_chunks(&[new_chunk("a", "d1", 1)]).await.unwrap();

        let err = store
            .insert_chunks(&[new_chunk("b", "d2", 2), new_chunk("a", "d2", 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Storage(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.insert_chunks(&[new_chunk("a", "d1", 1)]).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(!store.delete("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn scan_orders_by_time_then_id_and_lists_documents() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(&[new_chunk("z", "beta", 5), new_chunk("b", "alpha", 1)])
            .await
            .unwrap();
        store
            .insert_record(&ChunkRecord {
                id: "a".to_string(),
                doc_id: None,
                text: None,
                index_key: Some(IndexKey::Undecodable { bytes: 3 }),
                created_at: 1,
            })
            .await
            .unwrap();

        let ids: Vec<String> = store.scan().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b", "z"]);
        assert_eq!(store.document_ids().await.unwrap(), vec!["alpha", "beta"]);
        assert_eq!(store.chunk_ids(2).await.unwrap(), vec!["a", "b"]);
    }
}
