//! Hybrid ranking of stored chunks against a question.
//!
//! Retrieval is a full pass over the candidate set:
//!
//! 1. Drop every chunk the active [`RuleSet`] rejects, plus any chunk that
//!    lacks the text, document id or dense key needed to score it.
//! 2. Score each candidate twice: cosine similarity between its index key
//!    and the question embedding, and keyword overlap with the question.
//! 3. Min-max normalise both signals to `[0, 1]` and merge them as
//!    `alpha * vector + (1 - alpha) * keyword`.
//! 4. Sort by score descending, then `created_at`, then id, and keep `top_k`.
//!
//! Ranking is pure; the caller supplies the scanned records.

use std::collections::HashSet;

use crate::detect::RuleSet;
use crate::embedding::{cosine_similarity, tokenize};
use crate::models::{ChunkRecord, RetrievedChunk};

/// Fraction of distinct query tokens that occur in `text`.
pub fn keyword_overlap(query_tokens: &HashSet<String>, text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens: HashSet<String> = tokenize(text).into_iter().collect();
    let hits = query_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    hits as f64 / query_tokens.len() as f64
}

/// Min-max normalise scores to [0, 1]. Equal scores all become 1.0.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }

    let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    raw.iter()
        .map(|s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

struct Candidate<'a> {
    record: &'a ChunkRecord,
    doc_id: &'a str,
    text: &'a str,
    vector: f64,
    keyword: f64,
}

/// Rank `records` for `question` and return at most `top_k` chunks.
pub fn rank(
    records: &[ChunkRecord],
    rules: &RuleSet,
    question: &str,
    question_vec: &[f32],
    alpha: f64,
    top_k: usize,
) -> Vec<RetrievedChunk> {
    let query_tokens: HashSet<String> = tokenize(question).into_iter().collect();

    let candidates: Vec<Candidate> = records
        .iter()
        .filter(|r| rules.is_valid(r))
        .filter_map(|r| {
            let doc_id = r.doc_id.as_deref().filter(|d| !d.is_empty())?;
            let text = r.text.as_deref().filter(|t| !t.trim().is_empty())?;
            let key = r.index_key.as_ref()?.as_dense()?;
            Some(Candidate {
                record: r,
                doc_id,
                text,
                vector: cosine_similarity(key, question_vec) as f64,
                keyword: keyword_overlap(&query_tokens, text),
            })
        })
        .collect();

    let vec_norm = normalize_scores(&candidates.iter().map(|c| c.vector).collect::<Vec<_>>());
    let kw_norm = normalize_scores(&candidates.iter().map(|c| c.keyword).collect::<Vec<_>>());

    let mut scored: Vec<(f64, &Candidate)> = candidates
        .iter()
        .zip(vec_norm.iter().zip(kw_norm.iter()))
        .map(|(c, (v, k))| (alpha * v + (1.0 - alpha) * k, c))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.record.created_at.cmp(&b.1.record.created_at))
            .then(a.1.record.id.cmp(&b.1.record.id))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(score, c)| RetrievedChunk {
            chunk_id: c.record.id.clone(),
            doc_id: c.doc_id.to_string(),
            text: c.text.to_string(),
            score,
        })
        .collect()
}

/// Document ids of `chunks` in rank order, first occurrence wins.
pub fn source_ids(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.doc_id.as_str()))
        .map(|c| c.doc_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::IndexKey;

    fn record(embedder: &HashEmbedder, id: &str, doc: &str, text: &str, ts: i64) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            doc_id: Some(doc.to_string()),
            text: Some(text.to_string()),
            index_key: Some(IndexKey::Dense(embedder.embed_one(text))),
            created_at: ts,
        }
    }

    fn tokens(q: &str) -> HashSet<String> {
        tokenize(q).into_iter().collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single() {
        let result = normalize_scores(&[5.0]);
        assert!((result[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_range() {
        let result = normalize_scores(&[10.0, 5.0, 0.0]);
        assert!((result[0] - 1.0).abs() < 1e-9);
        assert!((result[1] - 0.5).abs() < 1e-9);
        assert!((result[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        for score in normalize_scores(&[3.0, 3.0]) {
            assert!((score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scores_always_in_unit() {
        for score in normalize_scores(&[-5.0, 100.0, 42.0]) {
            assert!((0.0..=1.0).contains(&score), "Score out of range: {}", score);
        }
    }

    #[test]
    fn test_keyword_overlap_fraction() {
        let q = tokens("capital of France");
        assert!((keyword_overlap(&q, "Paris is the capital of France.") - 1.0).abs() < 1e-9);
        assert!((keyword_overlap(&q, "France borders Spain") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(keyword_overlap(&tokens("..."), "anything"), 0.0);
    }

    #[test]
    fn test_rank_prefers_matching_chunk() {
        let e = HashEmbedder::new(256);
        let records = vec![
            record(&e, "c1", "k8s", "Kubernetes schedules containers onto nodes", 1),
            record(&e, "c2", "faq1", "Paris is the capital of France.", 2),
        ];
        let q = "What is the capital of France?";
        let out = rank(&records, &RuleSet::with_defaults(256), q, &e.embed_one(q), 0.6, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].doc_id, "faq1");
    }

    #[test]
    fn test_rank_skips_rejected_chunks() {
        let e = HashEmbedder::new(256);
        let mut broken = record(&e, "c1", "faq1", "Paris is the capital of France.", 1);
        broken.index_key = Some(IndexKey::Dense(vec![1.0; 3]));
        let records = vec![broken, record(&e, "c2", "other", "Unrelated notes", 2)];

        let q = "capital of France";
        let out = rank(&records, &RuleSet::with_defaults(256), q, &e.embed_one(q), 0.6, 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk_id, "c2");
    }

    #[test]
    fn test_rank_skips_unscorable_chunks_even_with_empty_rules() {
        let e = HashEmbedder::new(16);
        let mut no_text = record(&e, "c1", "d", "x", 1);
        no_text.text = None;
        let out = rank(&[no_text], &RuleSet::new(), "x", &e.embed_one("x"), 0.5, 5);
        assert!(out.is_empty());
    }

    #[test]
    fn test_ties_break_on_time_then_id() {
        let e = HashEmbedder::new(32);
        let records = vec![
            record(&e, "b", "d2", "same text", 5),
            record(&e, "a", "d1", "same text", 5),
            record(&e, "z", "d0", "same text", 1),
        ];
        let rules = RuleSet::with_defaults(32);
        let query = e.embed_one("same text");
        let out = rank(&records, &rules, "same text", &query, 0.6, 3);
        let ids: Vec<&str> = out.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_alpha_zero_is_keyword_order() {
        let e = HashEmbedder::new(64);
        let records = vec![
            record(&e, "c1", "d1", "rust borrow checker", 1),
            record(&e, "c2", "d2", "rust", 2),
        ];
        let q = "rust borrow";
        let out = rank(&records, &RuleSet::with_defaults(64), q, &e.embed_one("unrelated"), 0.0, 2);
        assert_eq!(out[0].chunk_id, "c1");
        assert!((out[0].score - 1.0).abs() < 1e-9);
        assert!(out[1].score.abs() < 1e-9);
    }

    #[test]
    fn test_source_ids_dedup_in_rank_order() {
        let chunk = |doc: &str| RetrievedChunk {
            chunk_id: String::new(),
            doc_id: doc.to_string(),
            text: String::new(),
            score: 0.0,
        };
        let ids = source_ids(&[chunk("b"), chunk("a"), chunk("b")]);
        assert_eq!(ids, vec!["b", "a"]);
    }
}
