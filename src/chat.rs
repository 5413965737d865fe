//! Long-term memory capture from chat messages.
//!
//! `POST /chat` hands each user message to [`capture`] on a detached task.
//! A message becomes a stored memory only if it survives three gates:
//!
//! 1. [`prefilter`]: very short messages, small talk and passing states
//!    ("i'm tired") are dropped without calling the engine.
//! 2. The engine classifies the message and answers with
//!    `{"store": bool, "title": str, "memory": str}`.
//! 3. [`guardrails`]: the extracted memory must have at least four words,
//!    no greeting, and fit in 800 characters.
//!
//! Accepted memories go through the regular ingestion pipeline with the
//! title as document id.

use serde::Deserialize;

use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::engine::AnswerEngine;
use crate::error::{KbError, Result};
use crate::ingest;
use crate::models::Content;
use crate::store::ChunkStore;

/// Document id for memories the classifier left untitled.
pub const DEFAULT_MEMORY_TITLE: &str = "Personal Memory";

const MIN_MESSAGE_CHARS: usize = 6;
const MIN_MEMORY_WORDS: usize = 4;
const MAX_MEMORY_CHARS: usize = 800;

const SMALL_TALK: &[&str] = &[
    "hi", "hello", "hey", "yo", "sup", "wassup", "heyy", "hiii", "thanks", "thank you", "ty",
    "thx", "ok", "okay", "k", "kk", "lol", "lmao", "haha", "hehe", "nice", "cool", "great", "yes",
    "no", "yep", "nope", "sure", "alright", "got it", "continue", "go on", "next", "hmm", "hmmm",
    "brb", "gn", "good night",
];

const TRANSIENT_STATES: &[&str] = &[
    "i'm tired",
    "i'm sleepy",
    "i'm hungry",
    "i'm eating",
    "i'm going to",
    "i'm heading",
    "i'm about to",
    "i'm watching",
    "i'm playing",
    "i'm working",
    "i'm studying",
    "i'm busy",
];

const GREETINGS: &[&str] = &["hi ", "hello", "hey ", "thanks"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HardFilter,
    TransientState,
    Rejected,
    TooShort,
    Greeting,
    TooLong,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Stored {
        title: String,
        memory: String,
        chunks: usize,
    },
    Skipped(SkipReason),
}

/// Engine reply to the classification prompt.
#[derive(Debug, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub store: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

/// Cheap checks that reject a message before any engine call.
pub fn prefilter(message: &str) -> Option<SkipReason> {
    let text = message.trim();
    let lower = text.to_lowercase();

    if text.chars().count() < MIN_MESSAGE_CHARS || SMALL_TALK.contains(&lower.as_str()) {
        return Some(SkipReason::HardFilter);
    }
    if (lower.starts_with("i'm ") || lower.starts_with("im "))
        && TRANSIENT_STATES.iter().any(|p| lower.contains(p))
    {
        return Some(SkipReason::TransientState);
    }
    None
}

pub fn classifier_prompt(message: &str) -> String {
    format!(
        r#"You classify chat messages for a long-term personal memory store.
Decide whether the user's message reveals persistent, useful information about themselves.

USER MESSAGE (exact):
"""
{message}
"""

STORE ONLY stable personal facts: name, age, location, job, education, family;
strong preferences (food, music, hobbies, allergies, values); routines and habits;
goals, fears, beliefs, personality traits; ongoing contexts such as job hunting,
learning a skill or a health condition.

REJECT temporary states, chit-chat, greetings, acknowledgments, and commands or
questions that reveal nothing personal.

Reply with valid JSON only, no explanation and no markdown:
{{"store": true|false, "title": "memory title, at most 8 words", "memory": "the fact in neutral wording"}}

EXAMPLES:
"Hey, just wanted to say hi!" -> {{"store": false}}
"My name is Sarah and I'm a 28-year-old designer from Berlin" -> {{"store": true, "title": "User name and background", "memory": "Name is Sarah, 28 years old, designer living in Berlin"}}
"Haha yeah that's funny" -> {{"store": false}}
"#,
        message = message.trim()
    )
}

/// Parse the engine reply, tolerating a fenced ```json block.
pub fn parse_classification(raw: &str) -> Result<Classification> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim())
        .map_err(|e| KbError::downstream(format!("memory classifier returned invalid JSON: {}", e)))
}

/// Final checks on an accepted classification. Returns `(title, memory)`.
pub fn guardrails(c: &Classification) -> std::result::Result<(String, String), SkipReason> {
    if !c.store {
        return Err(SkipReason::Rejected);
    }
    let memory = c.memory.as_deref().unwrap_or("").trim();
    if memory.split_whitespace().count() < MIN_MEMORY_WORDS {
        return Err(SkipReason::TooShort);
    }
    let lower = memory.to_lowercase();
    if GREETINGS.iter().any(|g| lower.contains(g)) {
        return Err(SkipReason::Greeting);
    }
    if memory.chars().count() > MAX_MEMORY_CHARS {
        return Err(SkipReason::TooLong);
    }

    let title = c
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_MEMORY_TITLE);
    Ok((title.to_string(), memory.to_string()))
}

/// Run all three gates and store the memory if it passes.
pub async fn capture(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    engine: &dyn AnswerEngine,
    chunking: &ChunkingConfig,
    message: &str,
) -> Result<Verdict> {
    if let Some(reason) = prefilter(message) {
        return Ok(Verdict::Skipped(reason));
    }

    let raw = engine.generate(&classifier_prompt(message)).await?;
    let classification = parse_classification(&raw)?;
    let (title, memory) = match guardrails(&classification) {
        Ok(accepted) => accepted,
        Err(reason) => return Ok(Verdict::Skipped(reason)),
    };

    let outcome = ingest::ingest(
        store,
        embedder,
        chunking,
        &title,
        Content::Text(memory.clone()),
    )
    .await?;

    Ok(Verdict::Stored {
        title,
        memory,
        chunks: outcome.accepted_chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedEngine {
        reply: String,
        calls: AtomicUsize,
    }

    impl CannedEngine {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AnswerEngine for CannedEngine {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn classification(store: bool, title: Option<&str>, memory: &str) -> Classification {
        Classification {
            store,
            title: title.map(str::to_string),
            memory: Some(memory.to_string()),
        }
    }

    #[test]
    fn small_talk_is_filtered() {
        assert_eq!(prefilter("hi"), Some(SkipReason::HardFilter));
        assert_eq!(prefilter("Thank you"), Some(SkipReason::HardFilter));
        assert_eq!(prefilter("  Good Night "), Some(SkipReason::HardFilter));
        assert_eq!(prefilter("My sister lives in Lisbon"), None);
    }

    #[test]
    fn transient_states_are_filtered() {
        assert_eq!(prefilter("I'm tired today"), Some(SkipReason::TransientState));
        assert_eq!(prefilter("I'm going to the shop"), Some(SkipReason::TransientState));
        assert_eq!(prefilter("I'm allergic to peanuts"), None);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"store\": true, \"title\": \"Allergy\", \"memory\": \"Is allergic to peanuts\"}\n```";
        let c = parse_classification(raw).unwrap();
        assert!(c.store);
        assert_eq!(c.title.as_deref(), Some("Allergy"));
        assert!(parse_classification("sure, here you go").is_err());
    }

    #[test]
    fn guardrails_reject_weak_memories() {
        assert_eq!(
            guardrails(&classification(false, None, "a b c d e")),
            Err(SkipReason::Rejected)
        );
        assert_eq!(
            guardrails(&classification(true, None, "likes tea")),
            Err(SkipReason::TooShort)
        );
        assert_eq!(
            guardrails(&classification(true, None, "said hello to everyone today")),
            Err(SkipReason::Greeting)
        );
        assert_eq!(
            guardrails(&classification(true, None, &"word ".repeat(200))),
            Err(SkipReason::TooLong)
        );
    }

    #[test]
    fn missing_title_uses_default() {
        let (title, memory) =
            guardrails(&classification(true, Some("  "), "Is allergic to peanuts")).unwrap();
        assert_eq!(title, DEFAULT_MEMORY_TITLE);
        assert_eq!(memory, "Is allergic to peanuts");
    }

    #[tokio::test]
    async fn filtered_message_never_reaches_engine() {
        let store = InMemoryStore::new();
        let engine = CannedEngine::new("{\"store\": true}");
        let chunking = ChunkingConfig::default();
        let verdict = capture(&store, &HashEmbedder::new(8), &engine, &chunking, "ok")
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Skipped(SkipReason::HardFilter));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepted_memory_is_ingested_under_title() {
        let store = InMemoryStore::new();
        let engine = CannedEngine::new(
            r#"{"store": true, "title": "Food allergy", "memory": "Is allergic to peanuts and shellfish"}"#,
        );
        let verdict = capture(
            &store,
            &HashEmbedder::new(8),
            &engine,
            &ChunkingConfig::default(),
            "I'm allergic to peanuts and shellfish",
        )
        .await
        .unwrap();

        assert!(matches!(verdict, Verdict::Stored { chunks: 1, .. }));
        assert_eq!(store.document_ids().await.unwrap(), vec!["Food allergy"]);
    }
}
