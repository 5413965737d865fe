//! # recall-kb
//!
//! Backend of a personal knowledge-base assistant: documents are split into
//! chunks, embedded and stored in SQLite; questions are answered by an
//! external language model from the most relevant chunks; and the store is
//! kept healthy by a rule-based corruption detector with a detect-then-delete
//! cleanup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ text / file │──▶│  Ingestion    │──▶│ Chunk Store │
//! └─────────────┘   │ chunk + embed │   │   SQLite    │
//!                   └──────────────┘   └──────┬──────┘
//!                                             │
//!                   ┌─────────────────────────┼───────────────┐
//!                   ▼                         ▼               ▼
//!            ┌────────────┐           ┌──────────────┐  ┌──────────┐
//!            │  Detector  │──────────▶│ Maintenance  │  │   Ask    │──▶ engine
//!            │  RuleSet   │           │ clean/forget │  │ hybrid   │
//!            └────────────┘           └──────────────┘  └──────────┘
//! ```
//!
//! The detector's [`detect::RuleSet`] is also the candidate filter of
//! [`ask`], so a chunk that would be reported as corrupted is never
//! retrieved, whether or not cleanup has run.
//!
//! ## Quick Start
//!
//! ```bash
//! recall init
//! recall ingest faq1 --text "Paris is the capital of France."
//! recall detect
//! recall ask "What is the capital of France?" --top-k 1
//! recall serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy shared by all operations |
//! | [`models`] | Core data types |
//! | [`store`] | Chunk store trait, SQLite and in-memory backends |
//! | [`extract`] | Text extraction for uploaded files |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`ingest`] | Ingestion pipeline |
//! | [`detect`] | Corruption rules and detector |
//! | [`maintenance`] | Cleanup and similarity forgetting |
//! | [`search`] | Hybrid ranking |
//! | [`engine`] | Answer-generation engine |
//! | [`ask`] | Query façade and prompt |
//! | [`chat`] | Memory capture from chat messages |
//! | [`service`] | The assembled knowledge base |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod detect;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod maintenance;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod service;
pub mod store;
