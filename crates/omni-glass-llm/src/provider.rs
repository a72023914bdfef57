//! The provider capability contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmResult;
use crate::types::{LlmRequest, StreamChunk};

/// Type alias for boxed chunk streams.
pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<StreamChunk>> + Send>>;

/// The capability contract every provider implements.
///
/// Both operations stream; a non-streaming implementation is
/// non-conformant. `is_remote()` is the only branch point callers may
/// use; it gates redaction in the safety layer.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider label (for logs and settings UI).
    fn label(&self) -> &str;

    /// Whether prompts leave the machine. Remote providers receive
    /// redacted text; local providers receive the original.
    fn is_remote(&self) -> bool;

    /// Stream a CLASSIFY request.
    async fn stream_classify(&self, request: &LlmRequest) -> LlmResult<ChunkStream>;

    /// Stream an EXECUTE request.
    async fn stream_execute(&self, request: &LlmRequest) -> LlmResult<ChunkStream>;
}

/// Blanket implementation so `Box<dyn LlmProvider>` satisfies
/// `P: LlmProvider` bounds.
#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn is_remote(&self) -> bool {
        (**self).is_remote()
    }

    async fn stream_classify(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        (**self).stream_classify(request).await
    }

    async fn stream_execute(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        (**self).stream_execute(request).await
    }
}

/// Configuration shared by the HTTP-backed providers.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// API base URL override (custom or compatible endpoints).
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("has_base_url", &self.base_url.is_some())
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new config with API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            base_url: None,
        }
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}
