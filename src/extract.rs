//! Text extraction for uploaded files.
//!
//! The file extension selects the extractor: `.pdf` goes through
//! `pdf-extract`, everything else (`.txt`, `.csv`, `.md`, …) must be valid
//! UTF-8. Any failure, including text that is blank after extraction, is a
//! [`KbError::Decode`] and the upload is discarded.

use std::path::Path;

use crate::error::{KbError, Result};

/// Extracts plain text from an uploaded file.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    let text = if is_pdf(filename) {
        extract_pdf(bytes)?
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| KbError::decode(format!("{} is not valid UTF-8: {}", filename, e)))?
    };

    if text.trim().is_empty() {
        return Err(KbError::decode(format!(
            "unable to extract meaningful text from {}",
            filename
        )));
    }
    Ok(text)
}

fn is_pdf(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| KbError::decode(format!("PDF extraction failed: {}", e)))
}
