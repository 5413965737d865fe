//! Store maintenance: detect-then-delete cleanup and similarity forgetting.
//!
//! Both operations delete one id at a time. Deleting an id that is already
//! gone is not an error and does not count, so concurrent runs are safe. A
//! failed delete is logged and the pass continues; the outcome then carries
//! `status: "error"` with the count of deletes that did succeed.

use std::collections::HashSet;

use crate::detect::{self, RuleSet};
use crate::embedding::{cosine_similarity, embed_query, tokenize, EmbeddingProvider};
use crate::error::{KbError, Result};
use crate::models::{CleanOutcome, ForgetOutcome};
use crate::search::keyword_overlap;
use crate::store::ChunkStore;

const VECTOR_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.3;

/// Delete every chunk the detector flags at the start of the call.
///
/// Chunks written after the scan are left for the next pass. A scan failure
/// is returned as an error since nothing can be deleted without it.
pub async fn clean(
    store: &dyn ChunkStore,
    rules: &RuleSet,
    preview_chars: usize,
) -> Result<CleanOutcome> {
    let report = detect::detect(store, rules, preview_chars).await?;

    let mut deleted = 0;
    let mut failed = 0;
    for entry in &report.entries {
        match store.delete(&entry.id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => {
                failed += 1;
                tracing::warn!(id = %entry.id, error = %e, "failed to delete corrupted chunk");
            }
        }
    }

    tracing::info!(
        detected = report.corrupted_count,
        deleted,
        failed,
        "clean finished"
    );

    Ok(CleanOutcome {
        status: if failed == 0 { "ok" } else { "error" }.to_string(),
        deleted,
    })
}

/// Similarity between a stored chunk and a forget query, clamped to 1.
pub fn forget_score(cosine: f64, keyword: f64) -> f64 {
    (VECTOR_WEIGHT * cosine + KEYWORD_WEIGHT * keyword).min(1.0)
}

/// Delete every chunk whose [`forget_score`] against `query` reaches `threshold`.
pub async fn forget_similar(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    threshold: f64,
) -> Result<ForgetOutcome> {
    let query = query.trim();
    if query.is_empty() {
        return Err(KbError::validation("query must not be empty"));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(KbError::validation("threshold must be in [0.0, 1.0]"));
    }

    let query_vec = embed_query(embedder, query).await?;
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    let records = store.scan().await?;

    let targets: Vec<String> = records
        .iter()
        .filter_map(|r| {
            let text = r.text.as_deref()?;
            let key = r.index_key.as_ref()?.as_dense()?;
            let score = forget_score(
                cosine_similarity(key, &query_vec) as f64,
                keyword_overlap(&query_tokens, text),
            );
            (score >= threshold).then(|| r.id.clone())
        })
        .collect();

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for id in &targets {
        match store.delete(id).await {
            Ok(true) => deleted.push(id.clone()),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "failed to delete matching chunk");
                failed.push(id.clone());
            }
        }
    }

    tracing::info!(
        matched = targets.len(),
        deleted = deleted.len(),
        failed = failed.len(),
        threshold,
        "forget finished"
    );

    Ok(ForgetOutcome {
        status: if failed.is_empty() { "ok" } else { "error" }.to_string(),
        query: query.to_string(),
        matched: targets.len(),
        deleted,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{ChunkRecord, IndexKey, NewChunk};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    fn record(id: &str, text: Option<&str>, ts: i64) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            doc_id: Some("doc".to_string()),
            text: text.map(str::to_string),
            index_key: Some(IndexKey::Dense(vec![1.0, 0.0])),
            created_at: ts,
        }
    }

    enum Fault {
        /// The delete returns a storage error.
        Fails,
        /// Another writer removes the row just before this delete runs.
        AlreadyGone,
    }

    /// Store that misbehaves when one id is deleted.
    struct FlakyStore {
        inner: InMemoryStore,
        poisoned: String,
        fault: Fault,
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
            self.inner.insert_chunks(chunks).await
        }
        async fn insert_record(&self, record: &ChunkRecord) -> Result<()> {
            self.inner.insert_record(record).await
        }
        async fn scan(&self) -> Result<Vec<ChunkRecord>> {
            self.inner.scan().await
        }
        async fn delete(&self, id: &str) -> Result<bool> {
            if id == self.poisoned {
                match self.fault {
                    Fault::Fails => return Err(KbError::Storage("disk full".into())),
                    Fault::AlreadyGone => {
                        self.inner.delete(id).await?;
                    }
                }
            }
            self.inner.delete(id).await
        }
        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
        async fn document_ids(&self) -> Result<Vec<String>> {
            self.inner.document_ids().await
        }
        async fn chunk_ids(&self, limit: usize) -> Result<Vec<String>> {
            self.inner.chunk_ids(limit).await
        }
    }

    #[tokio::test]
    async fn clean_deletes_flagged_and_is_idempotent() {
        let store = InMemoryStore::new();
        store.insert_record(&record("good", Some("fine text"), 1)).await.unwrap();
        store.insert_record(&record("bad1", Some(""), 2)).await.unwrap();
        store.insert_record(&record("bad2", None, 3)).await.unwrap();
        let rules = RuleSet::with_defaults(2);

        let first = clean(&store, &rules, 200).await.unwrap();
        assert_eq!(first.status, "ok");
        assert_eq!(first.deleted, 2);
        assert_eq!(store.scan().await.unwrap().len(), 1);

        let second = clean(&store, &rules, 200).await.unwrap();
        assert_eq!(second.deleted, 0);
    }

    #[tokio::test]
    async fn failed_delete_reports_partial_count() {
        let store = FlakyStore {
            inner: InMemoryStore::new(),
            poisoned: "bad1".to_string(),
            fault: Fault::Fails,
        };
        store.insert_record(&record("bad1", Some(""), 1)).await.unwrap();
        store.insert_record(&record("bad2", Some(""), 2)).await.unwrap();

        let out = clean(&store, &RuleSet::with_defaults(2), 200).await.unwrap();
        assert_eq!(out.status, "error");
        assert_eq!(out.deleted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chunk_removed_by_another_writer_is_not_an_error() {
        let store = FlakyStore {
            inner: InMemoryStore::new(),
            poisoned: "bad2".to_string(),
            fault: Fault::AlreadyGone,
        };
        store.insert_record(&record("good", Some("fine text"), 1)).await.unwrap();
        for (i, id) in ["bad1", "bad2", "bad3"].iter().enumerate() {
            store.insert_record(&record(id, Some(""), 2 + i as i64)).await.unwrap();
        }
        let rules = RuleSet::with_defaults(2);
        let detected = detect::detect(&store, &rules, 200).await.unwrap().corrupted_count;
        assert_eq!(detected, 3);

        let out = clean(&store, &rules, 200).await.unwrap();
        assert_eq!(out.status, "ok");
        assert_eq!(out.deleted, detected - 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn forget_score_is_clamped() {
        assert!((forget_score(1.0, 1.0) - 0.9).abs() < 1e-9);
        assert!((forget_score(2.0, 1.0) - 1.0).abs() < 1e-9);
        assert_eq!(forget_score(0.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn forget_removes_only_similar_chunks() {
        let store = InMemoryStore::new();
        let embedder = HashEmbedder::new(128);
        for (id, text) in [
            ("pet", "My cat is named Biscuit"),
            ("job", "I work as a backend engineer"),
        ] {
            store
                .insert_chunks(&[NewChunk {
                    id: id.to_string(),
                    doc_id: "memories".to_string(),
                    text: text.to_string(),
                    embedding: embedder.embed_one(text),
                    created_at: 1,
                }])
                .await
                .unwrap();
        }

        let out = forget_similar(&store, &embedder, "My cat is named Biscuit", 0.5)
            .await
            .unwrap();
        assert_eq!(out.status, "ok");
        assert_eq!(out.matched, 1);
        assert_eq!(out.deleted, vec!["pet"]);
        assert_eq!(store.chunk_ids(10).await.unwrap(), vec!["job"]);
    }

    #[tokio::test]
    async fn forget_rejects_empty_query() {
        let store = InMemoryStore::new();
        let err = forget_similar(&store, &HashEmbedder::new(8), "   ", 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Validation(_)));
    }
}
