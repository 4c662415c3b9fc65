//! Model client error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0} not found in environment variables")]
    MissingApiKey(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request to {backend} failed: {message}")]
    Transport { backend: &'static str, message: String },

    #[error("{backend} API returned {status}: {message}")]
    Api {
        backend: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} response contained no text")]
    EmptyResponse(&'static str),

    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("Remote file processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Unsupported media for {0}")]
    UnsupportedMedia(&'static str),

    #[error("Media error: {0}")]
    Media(#[from] rdash_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    pub fn transport(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            backend,
            message: err.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a repeated attempt could succeed.
    ///
    /// Rate limits, server errors and connection problems are retryable.
    /// Remote processing failures and timeouts of the whole upload flow are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Transport { .. } => true,
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AiError::transport("gemini", "connection reset").is_retryable());
        assert!(AiError::Api {
            backend: "openai",
            status: 429,
            message: "rate limited".into()
        }
        .is_retryable());
        assert!(AiError::Api {
            backend: "anthropic",
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!AiError::Api {
            backend: "gemini",
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!AiError::Timeout(300).is_retryable());
        assert!(!AiError::MissingApiKey("GEMINI_API_KEY").is_retryable());
    }

    #[test]
    fn test_missing_key_message() {
        assert_eq!(
            AiError::MissingApiKey("GEMINI_API_KEY").to_string(),
            "GEMINI_API_KEY not found in environment variables"
        );
    }
}
