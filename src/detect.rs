//! Corruption detection over the chunk store.
//!
//! A chunk is valid when every active [`CorruptionRule`] accepts it. Rules
//! are small named checks collected in a [`RuleSet`]; the detector runs all
//! of them against every stored chunk and gathers their reasons, so a chunk
//! that breaks several rules is reported with all of them.
//!
//! The same [`RuleSet`] is the candidate filter used by [`crate::ask`], so a
//! chunk the detector would flag is never retrieved as context.
//!
//! # Built-in rules
//!
//! | Name | Default | Flags |
//! |------|---------|-------|
//! | `empty_text` | yes | text absent or blank |
//! | `missing_doc_id` | yes | document id absent or blank |
//! | `index_key` | yes | index key absent, undecodable, wrong dimensionality, non-finite |
//! | `unreadable_text` | no | text that looks like binary or markup debris |
//! | `symbol_noise` | no | more than 35% ASCII punctuation |
//! | `unicode_noise` | no | code points above U+C350 |
//! | `repeated_chars` | no | long text built from three or fewer distinct characters |
//! | `too_few_words` | no | fewer than three words |
//! | `token_noise` | no | a token longer than 40 characters |
//! | `mostly_digits` | no | more than half digits |
//!
//! Detection never writes to the store.

use crate::error::{KbError, Result};
use crate::models::{ChunkRecord, CorruptedEntry, CorruptionReport, IndexKey};
use crate::store::ChunkStore;

/// Placeholder preview for a chunk without text.
pub const NO_TEXT_PREVIEW: &str = "<no text>";

// ═══════════════════════════════════════════════════════════════════════
// Rule trait
// ═══════════════════════════════════════════════════════════════════════

/// A named validity check.
///
/// `check` returns one human-readable reason per violation and an empty
/// list for a chunk the rule accepts.
pub trait CorruptionRule: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, chunk: &ChunkRecord) -> Vec<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// Structural rules
// ═══════════════════════════════════════════════════════════════════════

pub struct EmptyTextRule;

impl CorruptionRule for EmptyTextRule {
    fn name(&self) -> &str {
        "empty_text"
    }

    fn check(&self, chunk: &ChunkRecord) -> Vec<String> {
        match chunk.text.as_deref() {
            None => vec!["missing text".to_string()],
            Some(t) if t.trim().is_empty() => vec!["empty text".to_string()],
            Some(_) => Vec::new(),
        }
    }
}

pub struct MissingDocIdRule;

impl CorruptionRule for MissingDocIdRule {
    fn name(&self) -> &str {
        "missing_doc_id"
    }

    fn check(&self, chunk: &ChunkRecord) -> Vec<String> {
        match chunk.doc_id.as_deref() {
            None => vec!["missing doc id".to_string()],
            Some(d) if d.trim().is_empty() => vec!["empty doc id".to_string()],
            Some(_) => Vec::new(),
        }
    }
}

/// Index key must be present, decodable, finite and of the configured width.
pub struct IndexKeyRule {
    dims: usize,
}

impl IndexKeyRule {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl CorruptionRule for IndexKeyRule {
    fn name(&self) -> &str {
        "index_key"
    }

    fn check(&self, chunk: &ChunkRecord) -> Vec<String> {
        let vec = match &chunk.index_key {
            None => return vec!["missing index key".to_string()],
            Some(IndexKey::Undecodable { bytes }) => {
                return vec![format!("undecodable index key ({} bytes)", bytes)]
            }
            Some(IndexKey::Dense(v)) => v,
        };

        let mut reasons = Vec::new();
        if vec.len() != self.dims {
            reasons.push(format!(
                "index key has {} dimensions, expected {}",
                vec.len(),
                self.dims
            ));
        }
        if vec.iter().any(|x| !x.is_finite()) {
            reasons.push("index key contains non-finite values".to_string());
        }
        reasons
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Text quality rules (opt-in)
// ═══════════════════════════════════════════════════════════════════════
//
// These look only at non-blank text; absent or blank text is `empty_text`'s
// concern.

fn non_blank(chunk: &ChunkRecord) -> Option<&str> {
    chunk.text.as_deref().filter(|t| !t.trim().is_empty())
}

fn has_hex_escape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.windows(4).any(|w| {
        w[0] == b'\\' && w[1] == b'x' && w[2].is_ascii_hexdigit() && w[3].is_ascii_hexdigit()
    })
}

/// Heuristic for text that a person could read.
pub fn is_human_readable(text: &str) -> bool {
    let t = text.trim();
    if t.chars().count() < 10 {
        return false;
    }

    const BINARY_MARKERS: [&str; 5] = ["endstream", "obj", "xref", "%PDF", "stream"];
    if BINARY_MARKERS.iter().any(|m| t.contains(m)) {
        return false;
    }
    if has_hex_escape(t) {
        return false;
    }

    let letters = t.chars().filter(|c| c.is_alphabetic()).count();
    let symbols = t.chars().filter(|c| c.is_ascii_punctuation()).count();
    if letters == 0 || symbols > letters * 2 {
        return false;
    }

    let real_words = t
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
        .count();
    real_words >= 3
}

/// A text-only rule defined by a predicate that returns `true` for bad text.
struct TextHeuristic {
    name: &'static str,
    reason: &'static str,
    flags: fn(&str) -> bool,
}

impl CorruptionRule for TextHeuristic {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self, chunk: &ChunkRecord) -> Vec<String> {
        match non_blank(chunk) {
            Some(text) if (self.flags)(text) => vec![self.reason.to_string()],
            _ => Vec::new(),
        }
    }
}

fn ratio_exceeds(text: &str, pred: fn(&char) -> bool, ratio: f64) -> bool {
    let total = text.chars().count();
    total > 0 && text.chars().filter(pred).count() as f64 > total as f64 * ratio
}

fn heuristic(name: &str) -> Option<TextHeuristic> {
    let rule = match name {
        "unreadable_text" => TextHeuristic {
            name: "unreadable_text",
            reason: "text is not human readable",
            flags: |t| !is_human_readable(t),
        },
        "symbol_noise" => TextHeuristic {
            name: "symbol_noise",
            reason: "more than 35% punctuation",
            flags: |t| ratio_exceeds(t, |c| c.is_ascii_punctuation(), 0.35),
        },
        "unicode_noise" => TextHeuristic {
            name: "unicode_noise",
            reason: "contains unusual unicode characters",
            flags: |t| t.chars().any(|c| c as u32 > 50_000),
        },
        "repeated_chars" => TextHeuristic {
            name: "repeated_chars",
            reason: "repeated characters",
            flags: |t| {
                let mut distinct: Vec<char> = t.chars().collect();
                let len = distinct.len();
                distinct.sort_unstable();
                distinct.dedup();
                distinct.len() <= 3 && len > 20
            },
        },
        "too_few_words" => TextHeuristic {
            name: "too_few_words",
            reason: "fewer than 3 words",
            flags: |t| t.split_whitespace().count() < 3,
        },
        "token_noise" => TextHeuristic {
            name: "token_noise",
            reason: "token longer than 40 characters",
            flags: |t| t.split_whitespace().any(|w| w.chars().count() > 40),
        },
        "mostly_digits" => TextHeuristic {
            name: "mostly_digits",
            reason: "mostly digits",
            flags: |t| ratio_exceeds(t, |c| c.is_ascii_digit(), 0.5),
        },
        _ => return None,
    };
    Some(rule)
}

// ═══════════════════════════════════════════════════════════════════════
// Rule set
// ═══════════════════════════════════════════════════════════════════════

/// Ordered collection of active rules.
pub struct RuleSet {
    rules: Vec<Box<dyn CorruptionRule>>,
}

impl RuleSet {
    /// Rules active when `maintenance.rules` is not configured.
    pub const DEFAULT_RULES: &'static [&'static str] =
        &["empty_text", "missing_doc_id", "index_key"];

    /// Every built-in rule name.
    pub const KNOWN_RULES: &'static [&'static str] = &[
        "empty_text",
        "missing_doc_id",
        "index_key",
        "unreadable_text",
        "symbol_noise",
        "unicode_noise",
        "repeated_chars",
        "too_few_words",
        "token_noise",
        "mostly_digits",
    ];

    /// Creates an empty rule set. Every chunk passes an empty set.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn is_known(name: &str) -> bool {
        Self::KNOWN_RULES.contains(&name)
    }

    /// The default structural rules for an index of `dims` dimensions.
    pub fn with_defaults(dims: usize) -> Self {
        let mut set = Self::new();
        set.register(Box::new(EmptyTextRule));
        set.register(Box::new(MissingDocIdRule));
        set.register(Box::new(IndexKeyRule::new(dims)));
        set
    }

    /// Builds a rule set from built-in rule names, in the given order.
    ///
    /// Duplicate names are registered once.
    pub fn from_names(names: &[String], dims: usize) -> Result<Self> {
        let mut set = Self::new();
        for name in names {
            if set.find(name).is_some() {
                continue;
            }
            let rule: Box<dyn CorruptionRule> = match name.as_str() {
                "empty_text" => Box::new(EmptyTextRule),
                "missing_doc_id" => Box::new(MissingDocIdRule),
                "index_key" => Box::new(IndexKeyRule::new(dims)),
                other => match heuristic(other) {
                    Some(rule) => Box::new(rule),
                    None => {
                        return Err(KbError::validation(format!(
                            "unknown corruption rule: {}",
                            other
                        )))
                    }
                },
            };
            set.register(rule);
        }
        Ok(set)
    }

    /// Adds a rule. Rules run in registration order.
    pub fn register(&mut self, rule: Box<dyn CorruptionRule>) {
        self.rules.push(rule);
    }

    pub fn find(&self, name: &str) -> Option<&dyn CorruptionRule> {
        self.rules
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Reasons from every rule, in rule order. Empty means valid.
    pub fn reasons(&self, chunk: &ChunkRecord) -> Vec<String> {
        self.rules.iter().flat_map(|r| r.check(chunk)).collect()
    }

    pub fn is_valid(&self, chunk: &ChunkRecord) -> bool {
        self.rules.iter().all(|r| r.check(chunk).is_empty())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Detection
// ═══════════════════════════════════════════════════════════════════════

/// First `max_chars` characters of the chunk text, or [`NO_TEXT_PREVIEW`].
pub fn preview(chunk: &ChunkRecord, max_chars: usize) -> String {
    match non_blank(chunk) {
        Some(text) => text.chars().take(max_chars).collect(),
        None => NO_TEXT_PREVIEW.to_string(),
    }
}

/// Classifies `records` without touching any store.
pub fn classify(
    records: &[ChunkRecord],
    rules: &RuleSet,
    preview_chars: usize,
) -> CorruptionReport {
    let entries: Vec<CorruptedEntry> = records
        .iter()
        .filter_map(|chunk| {
            let reasons = rules.reasons(chunk);
            if reasons.is_empty() {
                return None;
            }
            Some(CorruptedEntry {
                id: chunk.id.clone(),
                doc_preview: preview(chunk, preview_chars),
                reasons,
            })
        })
        .collect();

    CorruptionReport {
        scanned: records.len(),
        corrupted_count: entries.len(),
        entries,
    }
}

/// Full scan of the store. Read-only.
pub async fn detect(
    store: &dyn ChunkStore,
    rules: &RuleSet,
    preview_chars: usize,
) -> Result<CorruptionReport> {
    let records = store.scan().await?;
    let report = classify(&records, rules, preview_chars);
    tracing::info!(
        scanned = report.scanned,
        corrupted = report.corrupted_count,
        "corruption scan finished"
    );
    Ok(report)
}
