//! Query façade: retrieve context, build the prompt, call the engine.
//!
//! The engine is always called, with an empty context section when nothing
//! was retrieved; its failures are returned as [`KbError::Downstream`].

use crate::config::Config;
use crate::detect::RuleSet;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::engine::AnswerEngine;
use crate::error::{KbError, Result};
use crate::models::{Answer, RetrievedChunk};
use crate::search;
use crate::store::ChunkStore;

const NO_CONTEXT: &str = "(no context available)";

/// Render the retrieval-augmented prompt sent to the engine.
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk], persona: Option<&str>) -> String {
    let context = if chunks.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        chunks
            .iter()
            .enumerate()
            .map(|(idx, c)| format!("Source [{}] (doc_id: {}):\n{}", idx + 1, c.doc_id, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut prompt = format!(
        "You are an assistant answering questions from a personal knowledge base.\n\
         \n\
         RULES:\n\
         - Use ONLY the provided context.\n\
         - If the answer is not in the context, reply strictly: \"I don't know\".\n\
         - Be concise and helpful.\n\
         - Do NOT make anything up.\n\
         \n\
         ---------------------\n\
         CONTEXT:\n\
         {}\n\
         ---------------------\n\
         \n\
         USER QUESTION:\n\
         {}\n",
        context,
        question.trim()
    );

    if let Some(persona) = persona.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push('\n');
        prompt.push_str(persona);
        prompt.push('\n');
    }
    prompt
}

/// Resolve a requested `top_k` against the retrieval settings.
pub fn effective_top_k(requested: Option<usize>, config: &Config) -> Result<usize> {
    let k = requested.unwrap_or(config.retrieval.default_top_k);
    if k == 0 {
        return Err(KbError::validation("top_k must be >= 1"));
    }
    Ok(k.min(config.retrieval.max_top_k))
}

/// Answer `question` from the chunks in `store`.
pub async fn ask(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    engine: &dyn AnswerEngine,
    rules: &RuleSet,
    config: &Config,
    question: &str,
    top_k: Option<usize>,
) -> Result<Answer> {
    if question.trim().is_empty() {
        return Err(KbError::validation("question must not be empty"));
    }
    let top_k = effective_top_k(top_k, config)?;

    let records = store.scan().await?;
    let question_vec = embed_query(embedder, question).await?;
    let retrieved = search::rank(
        &records,
        rules,
        question,
        &question_vec,
        config.retrieval.hybrid_alpha,
        top_k,
    );
    tracing::debug!(
        candidates = records.len(),
        retrieved = retrieved.len(),
        top_k,
        "retrieved context"
    );

    let prompt = build_prompt(question, &retrieved, config.engine.persona.as_deref());
    let answer = engine.generate(&prompt).await.map_err(|e| match e {
        KbError::Downstream(msg) => KbError::Downstream(msg),
        other => KbError::downstream(other.to_string()),
    })?;

    Ok(Answer {
        answer,
        sources: search::source_ids(&retrieved),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c".to_string(),
            doc_id: doc.to_string(),
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn prompt_numbers_sources() {
        let p = build_prompt(
            "Where is Paris?",
            &[chunk("faq1", "Paris is in France."), chunk("faq2", "It is big.")],
            None,
        );
        assert!(p.contains("Source [1] (doc_id: faq1):\nParis is in France."));
        assert!(p.contains("Source [2] (doc_id: faq2):\nIt is big."));
        assert!(p.contains("USER QUESTION:\nWhere is Paris?"));
        assert!(p.contains("I don't know"));
    }

    #[test]
    fn prompt_without_context_says_so() {
        let p = build_prompt("anything", &[], None);
        assert!(p.contains(NO_CONTEXT));
    }

    #[test]
    fn persona_is_appended() {
        let p = build_prompt("q", &[], Some("Speak warmly."));
        assert!(p.trim_end().ends_with("Speak warmly."));
        let blank = build_prompt("q", &[], Some("   "));
        assert_eq!(blank, build_prompt("q", &[], None));
    }

    #[test]
    fn top_k_is_validated_and_capped() {
        let config: Config = toml::from_str(
            "[db]\npath = \"/tmp/x.sqlite\"\n[server]\nbind = \"127.0.0.1:0\"\n[retrieval]\nmax_top_k = 10\n",
        )
        .unwrap();
        assert_eq!(effective_top_k(None, &config).unwrap(), 4);
        assert_eq!(effective_top_k(Some(99), &config).unwrap(), 10);
        assert!(matches!(
            effective_top_k(Some(0), &config).unwrap_err(),
            KbError::Validation(_)
        ));
    }
}
