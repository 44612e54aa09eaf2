//! Error taxonomy shared by retrieval, transfer and job orchestration.

use crate::utils::format_bytes;
use thiserror::Error;

/// Errors that can end a relay job
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound job is malformed
    #[error("Invalid job: {0}")]
    Validation(String),
    /// The upstream server answered with a non-success status or the transfer broke
    #[error("{0}")]
    Upstream(String),
    /// Declared or actual size exceeds the configured maximum
    #[error("File too large: {} (limit {})", format_bytes(*size), format_bytes(*limit))]
    TooLarge {
        /// Size that triggered the error
        size: u64,
        /// Configured maximum
        limit: u64,
    },
    /// The media extractor failed or produced no file
    #[error("{0}")]
    Extraction(String),
    /// The retrieval router exhausted its policy
    #[error("{0}")]
    Retrieval(String),
    /// A messaging-platform operation failed
    #[error("Telegram error: {0}")]
    Transfer(String),
    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// HTTP status the API answers with for this error
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }
}

impl From<teloxide::RequestError> for RelayError {
    fn from(e: teloxide::RequestError) -> Self {
        Self::Transfer(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message_is_human_readable() {
        let err = RelayError::TooLarge {
            size: 3 * 1024 * 1024,
            limit: 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File too large: 3.00 MB (limit 1.00 MB)");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RelayError::Validation("bad".into()).status_code(), 400);
        assert_eq!(RelayError::Extraction("boom".into()).status_code(), 500);
        assert_eq!(RelayError::Upstream("HTTP 404".into()).status_code(), 500);
    }
}
