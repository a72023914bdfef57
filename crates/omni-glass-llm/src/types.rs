//! Request and stream-event types shared by all providers.

use omni_glass_core::TokenUsage;
use serde::{Deserialize, Serialize};

/// One streaming request: a system prompt, a user message, and a
/// completion budget. Both CLASSIFY and EXECUTE use this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// System prompt.
    pub system: String,
    /// User message.
    pub user: String,
    /// Maximum completion tokens.
    pub max_tokens: usize,
}

impl LlmRequest {
    /// Create a request with the default completion budget.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 4096,
        }
    }

    /// Set the completion budget.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// An event on a provider stream.
///
/// Every conformant stream is a sequence of [`StreamChunk::Delta`] events
/// terminated by exactly one [`StreamChunk::Done`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamChunk {
    /// Partial completion text.
    Delta(String),
    /// Final chunk carrying the round-trip's token usage.
    Done {
        /// Token usage for the request, when the endpoint reports it.
        usage: TokenUsage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = LlmRequest::new("sys", "user").max_tokens(512);
        assert_eq!(req.max_tokens, 512);
        assert_eq!(req.system, "sys");
    }
}
