//! Error taxonomy for the core operations.
//!
//! Every ingest, detect, clean and ask call returns [`Result`]. The four
//! variants map one-to-one onto HTTP status codes in [`crate::server`]:
//!
//! | Variant | Raised when | HTTP |
//! |---------|-------------|------|
//! | [`KbError::Validation`] | a required field is empty or missing; nothing was written | 400 |
//! | [`KbError::Decode`] | an uploaded file could not be turned into text; nothing was written | 422 |
//! | [`KbError::Storage`] | the backing store is unreachable or a write/delete failed | 500 |
//! | [`KbError::Downstream`] | the embedding service or answer engine failed | 502 |
//!
//! Configuration loading and CLI orchestration use `anyhow` instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("could not decode upload: {0}")]
    Decode(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("downstream service failed: {0}")]
    Downstream(String),
}

pub type Result<T> = std::result::Result<T, KbError>;

impl KbError {
    /// Machine-readable code used in JSON error bodies and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            KbError::Validation(_) => "validation_error",
            KbError::Decode(_) => "decode_error",
            KbError::Storage(_) => "storage_error",
            KbError::Downstream(_) => "downstream_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        KbError::Validation(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        KbError::Decode(message.into())
    }

    pub fn downstream(message: impl Into<String>) -> Self {
        KbError::Downstream(message.into())
    }
}

impl From<sqlx::Error> for KbError {
    fn from(err: sqlx::Error) -> Self {
        KbError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for KbError {
    fn from(err: reqwest::Error) -> Self {
        KbError::Downstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(KbError::validation("x").code(), "validation_error");
        assert_eq!(KbError::decode("x").code(), "decode_error");
        assert_eq!(KbError::Storage("x".into()).code(), "storage_error");
        assert_eq!(KbError::downstream("x").code(), "downstream_error");
    }

    #[test]
    fn sqlx_errors_become_storage_errors() {
        let err: KbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, KbError::Storage(_)));
    }
}
