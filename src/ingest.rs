//! Ingestion pipeline: content → text → chunks → embeddings → store.
//!
//! Every check happens before the first write. The chunks of one call are
//! committed through a single [`ChunkStore::insert_chunks`], so a failure at
//! any stage leaves the store unchanged. Re-ingesting an existing `doc_id`
//! appends new chunks next to the old ones.

use uuid::Uuid;

use crate::chunk::chunk_with;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{KbError, Result};
use crate::extract::extract_text;
use crate::models::{Content, IngestOutcome, NewChunk};
use crate::store::ChunkStore;

/// Pick the content of an ingest request that may carry text, a file, both
/// or neither. Empty parts count as absent; exactly one must remain.
pub fn select_content(text: Option<String>, file: Option<(String, Vec<u8>)>) -> Result<Content> {
    let text = text.filter(|t| !t.trim().is_empty());
    let file = file.filter(|(_, bytes)| !bytes.is_empty());

    match (text, file) {
        (Some(text), None) => Ok(Content::Text(text)),
        (None, Some((filename, bytes))) => Ok(Content::File { filename, bytes }),
        (Some(_), Some(_)) => Err(KbError::validation("provide either file or text, not both")),
        (None, None) => Err(KbError::validation("provide either file or text")),
    }
}

/// Ingest one document under `doc_id`.
pub async fn ingest(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    chunking: &ChunkingConfig,
    doc_id: &str,
    content: Content,
) -> Result<IngestOutcome> {
    let doc_id = doc_id.trim();
    if doc_id.is_empty() {
        return Err(KbError::validation("doc_id must not be empty"));
    }

    let kind = content.kind();
    let content_len = content.len();

    let text = match content {
        Content::Text(t) => {
            if t.trim().is_empty() {
                return Err(KbError::validation("content must not be empty"));
            }
            t
        }
        Content::File { filename, bytes } => {
            if bytes.is_empty() {
                return Err(KbError::validation("uploaded file is empty"));
            }
            extract_text(&filename, &bytes)?
        }
    };

    let pieces = chunk_with(&text, chunking);
    if pieces.is_empty() {
        return Err(KbError::validation("content must not be empty"));
    }

    let vectors = embedder.embed(&pieces).await?;
    if vectors.len() != pieces.len() {
        return Err(KbError::downstream(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            pieces.len()
        )));
    }
    let dims = embedder.dims();
    for v in &vectors {
        if v.len() != dims {
            return Err(KbError::downstream(format!(
                "embedder returned {} dimensions, expected {}",
                v.len(),
                dims
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(KbError::downstream("embedder returned non-finite values"));
        }
    }

    let created_at = chrono::Utc::now().timestamp();
    let chunks: Vec<NewChunk> = pieces
        .into_iter()
        .zip(vectors)
        .map(|(text, embedding)| NewChunk {
            id: Uuid::new_v4().to_string(),
            doc_id: doc_id.to_string(),
            text,
            embedding,
            created_at,
        })
        .collect();

    store.insert_chunks(&chunks).await?;

    tracing::info!(
        doc_id,
        source = ?kind,
        bytes = content_len,
        chunks = chunks.len(),
        "document ingested"
    );

    Ok(IngestOutcome {
        status: "ok".to_string(),
        doc_id: doc_id.to_string(),
        accepted_chunks: chunks.len(),
    })
}
