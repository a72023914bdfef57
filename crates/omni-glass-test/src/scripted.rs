//! A provider that replays canned stream chunks.
//!
//! Each call pops the next scripted completion off a queue and streams
//! it in small chunks, so skeleton extraction and strict parsing behave
//! exactly as they would against a network provider. Outbound requests
//! are recorded for assertions (redaction gating, prompt contents).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_stream::stream;
use async_trait::async_trait;

use omni_glass_core::TokenUsage;
use omni_glass_llm::{ChunkStream, LlmError, LlmProvider, LlmRequest, LlmResult, StreamChunk};

const CHUNK_SIZE: usize = 11;

/// Queue-backed scripted provider.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    remote: bool,
    classify_responses: Arc<Mutex<VecDeque<String>>>,
    execute_responses: Arc<Mutex<VecDeque<String>>>,
    classify_requests: Arc<Mutex<Vec<LlmRequest>>>,
    execute_requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl ScriptedProvider {
    /// A provider that reports itself remote (redaction applies).
    #[must_use]
    pub fn remote() -> Self {
        Self::new(true)
    }

    /// A provider that reports itself local (no redaction).
    #[must_use]
    pub fn local() -> Self {
        Self::new(false)
    }

    fn new(remote: bool) -> Self {
        Self {
            remote,
            classify_responses: Arc::new(Mutex::new(VecDeque::new())),
            execute_responses: Arc::new(Mutex::new(VecDeque::new())),
            classify_requests: Arc::new(Mutex::new(Vec::new())),
            execute_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a CLASSIFY completion.
    #[must_use]
    pub fn with_classify_response(self, body: impl Into<String>) -> Self {
        if let Ok(mut q) = self.classify_responses.lock() {
            q.push_back(body.into());
        }
        self
    }

    /// Queue an EXECUTE completion.
    #[must_use]
    pub fn with_execute_response(self, body: impl Into<String>) -> Self {
        if let Ok(mut q) = self.execute_responses.lock() {
            q.push_back(body.into());
        }
        self
    }

    /// Every CLASSIFY request seen so far.
    #[must_use]
    pub fn classify_requests(&self) -> Vec<LlmRequest> {
        self.classify_requests
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Every EXECUTE request seen so far.
    #[must_use]
    pub fn execute_requests(&self) -> Vec<LlmRequest> {
        self.execute_requests
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn stream_scripted(
        queue: &Arc<Mutex<VecDeque<String>>>,
        role: &'static str,
    ) -> LlmResult<ChunkStream> {
        let Some(body) = queue.lock().ok().and_then(|mut q| q.pop_front()) else {
            return Err(LlmError::ApiRequestFailed(format!(
                "no scripted {role} response queued"
            )));
        };
        let stream = stream! {
            let chars: Vec<char> = body.chars().collect();
            for piece in chars.chunks(CHUNK_SIZE) {
                yield Ok::<_, LlmError>(StreamChunk::Delta(piece.iter().collect()));
            }
            yield Ok(StreamChunk::Done {
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: body.len().saturating_div(4),
                },
            });
        };
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn label(&self) -> &str {
        "Scripted"
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    async fn stream_classify(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        if let Ok(mut seen) = self.classify_requests.lock() {
            seen.push(request.clone());
        }
        Self::stream_scripted(&self.classify_responses, "classify")
    }

    async fn stream_execute(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        if let Ok(mut seen) = self.execute_requests.lock() {
            seen.push(request.clone());
        }
        Self::stream_scripted(&self.execute_responses, "execute")
    }
}
