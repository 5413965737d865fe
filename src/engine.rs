//! Answer-generation engine abstraction.
//!
//! The engine is an external service: the core hands it a fully built
//! prompt and gets text back. Two implementations:
//! - **[`OpenAiChatEngine`]**: any OpenAI-compatible `POST /chat/completions`
//!   endpoint (Groq by default).
//! - **[`DisabledEngine`]**: fails every call with a downstream error, for
//!   deployments that only ingest and maintain.
//!
//! Calls are not retried. A failed call surfaces to the caller.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{KbError, Result};

#[async_trait]
pub trait AnswerEngine: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the [`AnswerEngine`] named by `config.provider`.
pub fn create_engine(config: &EngineConfig) -> Result<Box<dyn AnswerEngine>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEngine)),
        "openai" => Ok(Box::new(OpenAiChatEngine::new(config)?)),
        other => Err(KbError::validation(format!(
            "unknown engine provider: {}",
            other
        ))),
    }
}

pub struct DisabledEngine;

#[async_trait]
impl AnswerEngine for DisabledEngine {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(KbError::downstream(
            "answer engine is disabled; set [engine] provider = \"openai\"",
        ))
    }
}

pub struct OpenAiChatEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChatEngine {
    /// # Errors
    ///
    /// Returns a validation error if the API key environment variable is
    /// not set.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            KbError::validation(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl AnswerEngine for OpenAiChatEngine {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KbError::downstream(format!(
                "answer engine error {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| KbError::downstream("invalid completion response: missing message content"))
}
