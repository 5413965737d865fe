//! Core data models used throughout recall-kb.
//!
//! A document is never stored as such: the ingestion pipeline decomposes it
//! into [`NewChunk`]s, and the store hands back [`ChunkRecord`]s. A record is
//! the store's raw view of a row and can therefore describe a corrupted chunk
//! (missing text, missing document id, missing or malformed index key).

use serde::Serialize;

/// Where an ingested document came from. Logged, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Text,
    File,
}

/// Raw content submitted for ingestion.
#[derive(Debug, Clone)]
pub enum Content {
    /// Pasted text.
    Text(String),
    /// Uploaded file; the extension of `filename` selects the extractor.
    File { filename: String, bytes: Vec<u8> },
}

impl Content {
    pub fn kind(&self) -> SourceKind {
        match self {
            Content::Text(_) => SourceKind::Text,
            Content::File { .. } => SourceKind::File,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Text(t) => t.len(),
            Content::File { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The derived representation a chunk is retrieved by.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    /// A decoded embedding vector.
    Dense(Vec<f32>),
    /// Stored bytes that do not decode to whole `f32` values.
    Undecodable { bytes: usize },
}

impl IndexKey {
    pub fn as_dense(&self) -> Option<&[f32]> {
        match self {
            IndexKey::Dense(v) => Some(v),
            IndexKey::Undecodable { .. } => None,
        }
    }
}

/// A chunk as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub doc_id: Option<String>,
    pub text: Option<String>,
    pub index_key: Option<IndexKey>,
    /// Unix seconds.
    pub created_at: i64,
}

/// A fully populated chunk produced by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

impl From<NewChunk> for ChunkRecord {
    fn from(c: NewChunk) -> Self {
        ChunkRecord {
            id: c.id,
            doc_id: Some(c.doc_id),
            text: Some(c.text),
            index_key: Some(IndexKey::Dense(c.embedding)),
            created_at: c.created_at,
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub status: String,
    pub doc_id: String,
    pub accepted_chunks: usize,
}

/// One corrupted chunk in a [`CorruptionReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptedEntry {
    pub id: String,
    pub doc_preview: String,
    pub reasons: Vec<String>,
}

/// Output of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionReport {
    pub scanned: usize,
    pub corrupted_count: usize,
    pub entries: Vec<CorruptedEntry>,
}

/// Output of a cleanup pass.
#[derive(Debug, Clone, Serialize)]
pub struct CleanOutcome {
    /// `"ok"` or `"error"`.
    pub status: String,
    pub deleted: usize,
}

/// Output of a similarity-based deletion.
#[derive(Debug, Clone, Serialize)]
pub struct ForgetOutcome {
    pub status: String,
    pub query: String,
    pub matched: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// A chunk selected as generation context.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub score: f64,
}

/// Answer returned by the query façade.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}
