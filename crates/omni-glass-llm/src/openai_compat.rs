//! OpenAI-compatible streaming provider.
//!
//! Works with:
//! - Gemini's `OpenAI`-compatibility endpoint
//! - `OpenAI` API
//! - Any self-hosted `OpenAI`-compatible endpoint
//!
//! All of these are remote from the safety layer's point of view:
//! [`LlmProvider::is_remote`] returns `true` and outbound text is
//! redacted first.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use omni_glass_core::TokenUsage;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChunkStream, LlmProvider, ProviderConfig};
use crate::types::{LlmRequest, StreamChunk};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_COMPAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

/// OpenAI-compatible LLM provider (remote).
pub struct OpenAiCompatProvider {
    client: Client,
    config: ProviderConfig,
    label: String,
}

impl OpenAiCompatProvider {
    /// Create a provider against the `OpenAI` endpoint.
    #[must_use]
    pub fn openai(config: ProviderConfig) -> Self {
        Self::custom(config, "OpenAI")
    }

    /// Create a provider against Gemini's compatibility endpoint.
    #[must_use]
    pub fn gemini(mut config: ProviderConfig) -> Self {
        if config.base_url.is_none() {
            config.base_url = Some(GEMINI_COMPAT_URL.to_string());
        }
        Self::custom(config, "Google Gemini")
    }

    /// Create a provider with an explicit label (settings UI name).
    #[must_use]
    pub fn custom(config: ProviderConfig, label: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            label: label.into(),
        }
    }

    fn build_request(&self, request: &LlmRequest) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.min(self.config.max_tokens),
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "stream": true,
            "stream_options": {"include_usage": true},
        })
    }

    async fn open_stream(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: self.label.clone(),
            });
        }

        let request_body = self.build_request(request);
        let url = self.config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);

        debug!(model = %self.config.model, url = %url, "starting OpenAI-compatible stream");

        let mut auth_value =
            reqwest::header::HeaderValue::try_from(format!("Bearer {}", self.config.api_key))
                .map_err(|e| LlmError::ConfigError(format!("invalid API key characters: {e}")))?;
        auth_value.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("Authorization", auth_value)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "OpenAI-compatible API error");

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimitExceeded {
                    retry_after_secs: 60,
                });
            }

            return Err(LlmError::ApiRequestFailed(format!(
                "status {status}: {body}"
            )));
        }

        let stream = try_stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut usage = TokenUsage::default();
            let mut finished = false;

            use futures::StreamExt;

            while let Some(chunk) = bytes_stream.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    let rest_start = line_end.saturating_add(1);
                    buffer = buffer[rest_start..].to_string();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        finished = true;
                        yield StreamChunk::Done { usage };
                        continue;
                    }
                    let Ok(event) = serde_json::from_str::<CompletionChunk>(data) else {
                        continue;
                    };
                    if let Some(reported) = event.usage {
                        usage = TokenUsage {
                            input_tokens: reported.prompt_tokens,
                            output_tokens: reported.completion_tokens,
                        };
                    }
                    for choice in event.choices {
                        if let Some(content) = choice.delta.content
                            && !content.is_empty()
                        {
                            yield StreamChunk::Delta(content);
                        }
                    }
                }
            }

            if !finished {
                Err(LlmError::StreamInterrupted(
                    "stream ended without [DONE]".to_string(),
                ))?;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn stream_classify(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        self.open_stream(request).await
    }

    async fn stream_execute(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        self.open_stream(request).await
    }
}

// Streaming chunk types

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ReportedUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: ChoiceDelta,
}

#[derive(Debug, Deserialize)]
struct ChoiceDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportedUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}
