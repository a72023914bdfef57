//! Anthropic (Claude) streaming provider.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, trace};

use omni_glass_core::TokenUsage;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChunkStream, LlmProvider, ProviderConfig};
use crate::types::{LlmRequest, StreamChunk};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude LLM provider (remote).
pub struct ClaudeProvider {
    client: Client,
    config: ProviderConfig,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_request(&self, request: &LlmRequest) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.min(self.config.max_tokens),
            "system": request.system,
            "messages": [{"role": "user", "content": request.user}],
            "stream": true,
        })
    }

    async fn open_stream(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: "claude".to_string(),
            });
        }

        let request_body = self.build_request(request);
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

        debug!(model = self.config.model, "starting Claude stream");

        let mut api_key_header = reqwest::header::HeaderValue::try_from(&self.config.api_key)
            .map_err(|e| LlmError::ConfigError(format!("invalid API key characters: {e}")))?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Claude API error");

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

                // Process complete SSE events
                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    let rest_start = event_end.saturating_add(2);
                    buffer = buffer[rest_start..].to_string();

                    for line in event_data.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        let Ok(event) = serde_json::from_str::<StreamingEvent>(data) else {
                            continue;
                        };
                        match event {
                            StreamingEvent::MessageStart { message } => {
                                if let Some(input) = message
                                    .get("usage")
                                    .and_then(|u| u.get("input_tokens"))
                                    .and_then(Value::as_u64)
                                {
                                    usage.input_tokens = usize::try_from(input).unwrap_or(0);
                                }
                            }
                            StreamingEvent::ContentBlockDelta { delta } => {
                                let Delta::TextDelta { text } = delta;
                                yield StreamChunk::Delta(text);
                            }
                            StreamingEvent::MessageDelta { usage: Some(delta_usage) } => {
                                usage.output_tokens = delta_usage.output_tokens;
                            }
                            StreamingEvent::MessageDelta { usage: None } => {}
                            StreamingEvent::MessageStop => {
                                finished = true;
                                yield StreamChunk::Done { usage };
                            }
                            StreamingEvent::Ping => {
                                trace!("claude stream heartbeat");
                            }
                            StreamingEvent::Error { error } => {
                                Err(LlmError::ApiRequestFailed(error.to_string()))?;
                            }
                        }
                    }
                }
            }

            if !finished {
                Err(LlmError::StreamInterrupted(
                    "stream ended without message_stop".to_string(),
                ))?;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn label(&self) -> &str {
        "Anthropic Claude"
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

// Streaming event types.
//
// Only the events this host acts on are modelled. Since no tools block
// is ever sent, the stream carries exactly one text content block;
// bookkeeping events outside this set (content_block_start/stop) fail
// the tagged parse and are skipped by the read loop.

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamingEvent {
    MessageStart {
        message: Value,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_capability() {
        let provider = ClaudeProvider::new(ProviderConfig::new("k", "claude-sonnet-4-20250514"));
        assert!(provider.is_remote());
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let provider = ClaudeProvider::new(ProviderConfig::new("", "claude-sonnet-4-20250514"));
        let result = provider.stream_classify(&LlmRequest::new("s", "u")).await;
        let err = match result {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(matches!(err, LlmError::ApiKeyNotConfigured { .. }));
    }

    #[tokio::test]
    async fn invalid_key_characters_are_rejected() {
        let provider = ClaudeProvider::new(ProviderConfig::new("bad\nkey", "m"));
        let result = provider.stream_execute(&LlmRequest::new("s", "u")).await;
        let err = match result {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(matches!(err, LlmError::ConfigError(_)));
    }

    #[test]
    fn request_body_shape() {
        let provider = ClaudeProvider::new(
            ProviderConfig::new("k", "claude-sonnet-4-20250514").max_tokens(1024),
        );
        let body = provider.build_request(&LlmRequest::new("sys", "user").max_tokens(4096));
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body["stream"].as_bool().unwrap());
    }
}
