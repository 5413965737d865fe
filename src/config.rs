use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::RuleSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub inspect: InspectConfig,
    #[serde(default)]
    pub log: LogConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1200
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_embedding_base_url() -> String {
    "https://api.jina.ai/v1".to_string()
}
fn default_embedding_key_env() -> String {
    "JINA_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_provider")]
    pub provider: String,
    #[serde(default = "default_engine_base_url")]
    pub base_url: String,
    #[serde(default = "default_engine_model")]
    pub model: String,
    #[serde(default = "default_engine_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
    /// Extra instruction appended to every answer prompt.
    #[serde(default)]
    pub persona: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: default_engine_provider(),
            base_url: default_engine_base_url(),
            model: default_engine_model(),
            api_key_env: default_engine_key_env(),
            timeout_secs: default_engine_timeout(),
            persona: None,
        }
    }
}

impl EngineConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_engine_provider() -> String {
    "disabled".to_string()
}
fn default_engine_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_engine_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_engine_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_engine_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_top_k() -> usize {
    4
}
fn default_max_top_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<String>,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_forget_threshold")]
    pub forget_threshold: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            preview_chars: default_preview_chars(),
            forget_threshold: default_forget_threshold(),
        }
    }
}

fn default_rules() -> Vec<String> {
    RuleSet::DEFAULT_RULES.iter().map(|s| s.to_string()).collect()
}
fn default_preview_chars() -> usize {
    200
}
fn default_forget_threshold() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct InspectConfig {
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
        }
    }
}

fn default_preview_limit() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.engine.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown engine provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }
    if config.retrieval.max_top_k == 0 {
        anyhow::bail!("retrieval.max_top_k must be >= 1");
    }
    if config.retrieval.default_top_k == 0
        || config.retrieval.default_top_k > config.retrieval.max_top_k
    {
        anyhow::bail!("retrieval.default_top_k must be in [1, retrieval.max_top_k]");
    }

    for name in &config.maintenance.rules {
        if !RuleSet::is_known(name) {
            anyhow::bail!(
                "Unknown corruption rule: '{}'. Known rules: {}",
                name,
                RuleSet::KNOWN_RULES.join(", ")
            );
        }
    }
    if !(0.0..=1.0).contains(&config.maintenance.forget_threshold) {
        anyhow::bail!("maintenance.forget_threshold must be in [0.0, 1.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!(
            "[db]\npath = \"/tmp/recall.sqlite\"\n\n[server]\nbind = \"127.0.0.1:0\"\n\n{}",
            extra
        );
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.chunking.max_chars, 1200);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.embedding.dims, 256);
        assert!(!cfg.engine.is_enabled());
        assert_eq!(cfg.retrieval.default_top_k, 4);
        assert_eq!(
            cfg.maintenance.rules,
            vec!["empty_text", "missing_doc_id", "index_key"]
        );
        assert_eq!(cfg.inspect.preview_limit, 200);
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let err = parse("[chunking]\nmax_chars = 100\noverlap_chars = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn openai_embedding_requires_model() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let err = parse("[maintenance]\nrules = [\"empty_text\", \"vibes\"]\n").unwrap_err();
        assert!(err.to_string().contains("vibes"));
    }

    #[test]
    fn alpha_out_of_range_is_rejected() {
        assert!(parse("[retrieval]\nhybrid_alpha = 1.5\n").is_err());
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let err = parse("[engine]\nprovider = \"oracle\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown engine provider"));
    }
}
