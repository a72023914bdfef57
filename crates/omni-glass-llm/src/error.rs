//! LLM transport error types.

use thiserror::Error;

/// Result alias for transport operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors produced by LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key is configured for the provider.
    #[error("API key not configured for provider: {provider}")]
    ApiKeyNotConfigured {
        /// Provider label.
        provider: String,
    },

    /// The endpoint rejected the request.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// The endpoint rate-limited us.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Suggested wait before retrying.
        retry_after_secs: u64,
    },

    /// The response could not be interpreted.
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    /// The stream ended before a final chunk arrived.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Provider configuration is invalid.
    #[error("provider configuration error: {0}")]
    ConfigError(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether retrying later could help (network / rate-limit class).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimitExceeded { .. } | Self::StreamInterrupted(_)
        )
    }
}
