//! # recall CLI
//!
//! The `recall` binary drives a personal knowledge base from the terminal
//! and serves it over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and schema |
//! | `recall ingest <doc_id> --text T` / `--file F` | Chunk, embed and store a document |
//! | `recall documents [--preview]` | Show chunk count and document ids |
//! | `recall detect` | Report corrupted chunks |
//! | `recall clean` | Delete corrupted chunks |
//! | `recall ask "<question>"` | Answer a question from stored chunks |
//! | `recall forget "<query>"` | Delete chunks similar to a query |
//! | `recall serve` | Start the HTTP API server |
//! | `recall completions <shell>` | Print shell completions |
//!
//! Logs go to stderr; filter with `RUST_LOG` or `[log] filter`.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recall_kb::config::{self, Config};
use recall_kb::models::Content;
use recall_kb::service::KnowledgeBase;
use recall_kb::{migrate, server};

/// recall: a personal knowledge base with retrieval-augmented answers.
#[derive(Parser)]
#[command(name = "recall", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a document from pasted text or a file.
    Ingest {
        /// Document id the chunks are stored under.
        doc_id: String,

        /// Raw text to ingest.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// File to ingest (`.pdf`, or any UTF-8 text file).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the chunk count and stored document ids.
    Documents {
        /// List the first chunk ids instead of document ids.
        #[arg(long)]
        preview: bool,
    },

    /// Scan for corrupted chunks without deleting anything.
    Detect,

    /// Delete the chunks `detect` reports.
    Clean,

    /// Answer a question using the stored chunks as context.
    Ask {
        question: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Delete chunks similar to a query.
    Forget {
        query: String,

        /// Minimum similarity score in [0, 1].
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Print a shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing(cfg: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "recall", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { doc_id, text, file } => {
            let content = match (text, file) {
                (Some(text), _) => Content::Text(text),
                (None, Some(path)) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Content::File { filename, bytes }
                }
                (None, None) => anyhow::bail!("provide either --text or --file"),
            };
            let kb = KnowledgeBase::from_config(&cfg).await?;
            let out = kb.ingest(&doc_id, content).await?;
            println!("ingested {}", out.doc_id);
            println!("  chunks: {}", out.accepted_chunks);
        }
        Commands::Documents { preview } => {
            let kb = KnowledgeBase::from_config(&cfg).await?;
            if preview {
                let ids = kb.chunk_id_preview().await?;
                println!("total chunks: {}", kb.store().count().await?);
                for id in ids {
                    println!("  {}", id);
                }
            } else {
                let inventory = kb.inventory().await?;
                println!("total chunks: {}", inventory.total_chunks);
                for id in inventory.document_ids {
                    println!("  {}", id);
                }
            }
        }
        Commands::Detect => {
            let kb = KnowledgeBase::from_config(&cfg).await?;
            let report = kb.detect().await?;
            println!("rules: {}", kb.rules().names().join(", "));
            println!("scanned: {}", report.scanned);
            println!("corrupted: {}", report.corrupted_count);
            for entry in &report.entries {
                println!("  {} [{}]", entry.id, entry.reasons.join("; "));
                println!("    preview: \"{}\"", entry.doc_preview);
            }
        }
        Commands::Clean => {
            let kb = KnowledgeBase::from_config(&cfg).await?;
            let out = kb.clean().await?;
            println!("status: {}", out.status);
            println!("deleted: {}", out.deleted);
        }
        Commands::Ask { question, top_k } => {
            let kb = KnowledgeBase::from_config(&cfg).await?;
            let answer = kb.ask(&question, top_k).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("sources: {}", answer.sources.join(", "));
            }
        }
        Commands::Forget { query, threshold } => {
            let kb = KnowledgeBase::from_config(&cfg).await?;
            let out = kb.forget_similar(&query, threshold).await?;
            println!("status: {}", out.status);
            println!("matched: {}", out.matched);
            println!("deleted: {}", out.deleted.len());
            for id in &out.failed {
                println!("  failed: {}", id);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
