//! Sliding-window text chunker.
//!
//! Whitespace runs are collapsed to single spaces, then the text is cut into
//! windows of at most `max_chars` characters, each sharing `overlap_chars`
//! characters with the previous one. A window that does not reach the end
//! of the text is pulled back to its last space, as long as the next window
//! still starts after the current one.
//!
//! Windows are measured in `char`s, never bytes, so multi-byte text is never
//! split inside a code point. The output is deterministic and never contains
//! an empty chunk.

use crate::config::ChunkingConfig;

/// Split `text` according to the configured window.
pub fn chunk_with(text: &str, config: &ChunkingConfig) -> Vec<String> {
    chunk_text(text, config.max_chars, config.overlap_chars)
}

/// Split `text` into overlapping windows. Returns an empty list for blank text.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = normalized.chars().collect();
    let len = chars.len();

    if len == 0 || max_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap_chars.min(max_chars - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + max_chars).min(len);

        if end < len {
            // Prefer a word boundary, but only if the window stays longer than the overlap.
            if let Some(pos) = chars[start..end].iter().rposition(|c| *c == ' ') {
                let cut = start + pos;
                if cut > start + overlap {
                    end = cut;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= len {
            break;
        }
        start = end - overlap;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Paris is the capital of France.", 1200, 200);
        assert_eq!(chunks, vec!["Paris is the capital of France."]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text(" \n\t  ", 100, 10).is_empty());
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        let chunks = chunk_text("  alpha\n\n beta\t\tgamma  ", 100, 10);
        assert_eq!(chunks, vec!["alpha beta gamma"]);
    }

    #[test]
    fn test_windows_respect_max_and_cover_text() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {}", c);
            assert!(!c.is_empty());
        }
        assert!(chunks[0].starts_with("word0 "));
        assert!(chunks.last().unwrap().ends_with("word199"));
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = "abcdefghij".repeat(10);
        let chunks = chunk_text(&text, 30, 10);
        assert_eq!(chunks[0], &text[..30]);
        assert_eq!(chunks[1], &text[20..50]);
        assert!(chunks[0].ends_with(&chunks[1][..10]));
    }

    #[test]
    fn test_multibyte_text_is_not_split_inside_chars() {
        let text = "é".repeat(25);
        let chunks = chunk_text(&text, 10, 2);
        for c in &chunks {
            assert!(c.chars().all(|ch| ch == 'é'));
            assert!(c.chars().count() <= 10);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        assert_eq!(chunk_text(&text, 120, 30), chunk_text(&text, 120, 30));
    }

    #[test]
    fn test_overlap_not_smaller_than_window_still_terminates() {
        let chunks = chunk_text("aaaaaaaaaaaaaaaaaaaa", 5, 9);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.len() <= 5));
    }
}
