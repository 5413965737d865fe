//! The knowledge base: one store, one embedder, one engine, one rule set.
//!
//! [`KnowledgeBase`] is what the HTTP server and the CLI hold. Each method
//! forwards to the module that implements the operation, filling in the
//! configured collaborators.

use std::sync::Arc;

use crate::ask;
use crate::chat::{self, Verdict};
use crate::config::Config;
use crate::detect::{self, RuleSet};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::engine::{create_engine, AnswerEngine};
use crate::error::Result;
use crate::ingest;
use crate::maintenance;
use crate::models::{
    Answer, CleanOutcome, Content, CorruptionReport, ForgetOutcome, IngestOutcome,
};
use crate::store::sqlite::SqliteStore;
use crate::store::ChunkStore;

/// Inventory of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub total_chunks: usize,
    pub document_ids: Vec<String>,
}

pub struct KnowledgeBase {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: Arc<dyn AnswerEngine>,
    rules: RuleSet,
    config: Config,
}

impl KnowledgeBase {
    /// Assemble from explicit parts. The rule set is built from
    /// `config.maintenance.rules`.
    pub fn new(
        config: Config,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        engine: Arc<dyn AnswerEngine>,
    ) -> Result<Self> {
        let rules = RuleSet::from_names(&config.maintenance.rules, config.embedding.dims)?;
        Ok(Self {
            store,
            embedder,
            engine,
            rules,
            config,
        })
    }

    /// Open the SQLite store and build the configured providers.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(config).await?;
        let embedder = create_provider(&config.embedding)?;
        let engine = create_engine(&config.engine)?;
        tracing::debug!(
            db = %config.db.path.display(),
            embedder = embedder.model_name(),
            engine = engine.model_name(),
            "knowledge base opened"
        );
        if !config.engine.is_enabled() {
            tracing::warn!("answer engine is disabled; ask and chat capture will fail");
        }
        Ok(Self::new(
            config.clone(),
            Arc::new(store),
            Arc::from(embedder),
            Arc::from(engine),
        )?)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    pub async fn ingest(&self, doc_id: &str, content: Content) -> Result<IngestOutcome> {
        ingest::ingest(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.config.chunking,
            doc_id,
            content,
        )
        .await
    }

    pub async fn detect(&self) -> Result<CorruptionReport> {
        detect::detect(
            self.store.as_ref(),
            &self.rules,
            self.config.maintenance.preview_chars,
        )
        .await
    }

    pub async fn clean(&self) -> Result<CleanOutcome> {
        maintenance::clean(
            self.store.as_ref(),
            &self.rules,
            self.config.maintenance.preview_chars,
        )
        .await
    }

    /// `threshold` defaults to `maintenance.forget_threshold`.
    pub async fn forget_similar(
        &self,
        query: &str,
        threshold: Option<f64>,
    ) -> Result<ForgetOutcome> {
        maintenance::forget_similar(
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            threshold.unwrap_or(self.config.maintenance.forget_threshold),
        )
        .await
    }

    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        ask::ask(
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.engine.as_ref(),
            &self.rules,
            &self.config,
            question,
            top_k,
        )
        .await
    }

    pub async fn inventory(&self) -> Result<Inventory> {
        Ok(Inventory {
            total_chunks: self.store.count().await?,
            document_ids: self.store.document_ids().await?,
        })
    }

    /// First `inspect.preview_limit` chunk ids.
    pub async fn chunk_id_preview(&self) -> Result<Vec<String>> {
        self.store.chunk_ids(self.config.inspect.preview_limit).await
    }

    pub async fn capture_memory(&self, message: &str) -> Result<Verdict> {
        chat::capture(
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.engine.as_ref(),
            &self.config.chunking,
            message,
        )
        .await
    }

    /// Run [`Self::capture_memory`] on a detached task. The outcome is only
    /// logged.
    pub fn spawn_memory_capture(self: &Arc<Self>, message: String) {
        let kb = Arc::clone(self);
        tokio::spawn(async move {
            match kb.capture_memory(&message).await {
                Ok(Verdict::Stored { title, chunks, .. }) => {
                    tracing::info!(title = %title, chunks, "chat memory stored");
                }
                Ok(Verdict::Skipped(reason)) => {
                    tracing::debug!(?reason, "chat message not stored");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "chat memory capture failed");
                }
            }
        });
    }
}
