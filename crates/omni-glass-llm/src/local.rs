//! In-process local provider.
//!
//! A deterministic template model used when no cloud key is configured
//! (the "missing key" policy falls back here silently) or when the user
//! prefers to keep text on the machine. Because nothing leaves the
//! process, `is_remote()` is `false` and the safety layer skips
//! redaction.
//!
//! The model reads the structured sections of the assembled prompts
//! (`ACTION:` and `EXTRACTED TEXT:` markers) and emits the same JSON
//! envelopes a cloud model is instructed to produce, streamed in small
//! chunks so downstream skeleton extraction behaves identically.

use async_stream::stream;
use async_trait::async_trait;

use omni_glass_core::{
    Action, ActionMenu, ActionResult, ActionStatus, ContentType, ResultBody, ResultMeta,
    TokenUsage, fallback_menu,
};

use crate::error::LlmResult;
use crate::provider::{ChunkStream, LlmProvider};
use crate::types::{LlmRequest, StreamChunk};

const CHUNK_SIZE: usize = 24;

/// Marker line prefix carrying the selected action id in EXECUTE prompts.
pub const ACTION_MARKER: &str = "ACTION: ";
/// Marker heading that precedes the raw extracted text in both prompts.
pub const EXTRACTED_TEXT_MARKER: &str = "EXTRACTED TEXT:\n";

/// Deterministic in-process provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl LocalProvider {
    /// Create the local provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn extracted_text(user: &str) -> &str {
        user.rfind(EXTRACTED_TEXT_MARKER)
            .map_or(user, |at| &user[at.saturating_add(EXTRACTED_TEXT_MARKER.len())..])
    }

    fn classify_text(text: &str) -> ActionMenu {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return fallback_menu();
        }

        let lower = trimmed.to_lowercase();
        let looks_like_error = lower.contains("traceback")
            || lower.contains("exception")
            || lower.contains("error");
        let tabular_lines = trimmed
            .lines()
            .filter(|l| l.matches(['\t', '|']).count() >= 1)
            .count();
        let looks_like_table = tabular_lines >= 3;
        let looks_like_code = trimmed.lines().any(|l| {
            let l = l.trim_start();
            ["import ", "def ", "class ", "function ", "fn ", "const ", "#include", "let "]
                .iter()
                .any(|kw| l.starts_with(kw))
        });

        let summary_line: String = trimmed
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();

        let (content_type, actions) = if looks_like_error {
            (
                ContentType::Error,
                vec![
                    Action::new("fix_error", "Fix Error")
                        .icon("wrench")
                        .priority(1)
                        .description("Suggest a command that fixes this error")
                        .requires_execution(),
                    Action::new("explain", "Explain This")
                        .icon("sparkles")
                        .priority(2)
                        .description("Explain what went wrong")
                        .requires_execution(),
                    Action::new("search_web", "Search Web").icon("magnifier").priority(3),
                ],
            )
        } else if looks_like_table {
            (
                ContentType::Table,
                vec![
                    Action::new("export_csv", "Export as CSV")
                        .icon("table")
                        .priority(1)
                        .description("Convert the table to a CSV file")
                        .requires_execution(),
                    Action::new("summarize", "Summarize")
                        .icon("sparkles")
                        .priority(2)
                        .requires_execution(),
                ],
            )
        } else if looks_like_code {
            (
                ContentType::Code,
                vec![
                    Action::new("explain", "Explain Code")
                        .icon("sparkles")
                        .priority(1)
                        .requires_execution(),
                ],
            )
        } else {
            (
                ContentType::Prose,
                vec![
                    Action::new("summarize", "Summarize")
                        .icon("sparkles")
                        .priority(1)
                        .requires_execution(),
                    Action::new("search_web", "Search Web").icon("magnifier").priority(2),
                ],
            )
        };

        let mut menu = ActionMenu {
            content_type,
            confidence: 0.6,
            summary: summary_line,
            detected_language: None,
            actions,
            redaction_notices: Vec::new(),
        };
        menu.normalize();
        menu
    }

    fn execute_action(user: &str) -> ActionResult {
        let action_id = user
            .lines()
            .find_map(|l| l.strip_prefix(ACTION_MARKER))
            .unwrap_or("explain")
            .trim()
            .to_string();
        let text = Self::extracted_text(user).trim();

        if action_id == "export_csv" {
            let csv = to_csv(text);
            return ActionResult {
                status: ActionStatus::Success,
                action_id,
                result_body: ResultBody::File {
                    filename: "export.csv".to_string(),
                    content: csv,
                    mime: "text/csv".to_string(),
                },
                meta: ResultMeta::default(),
            };
        }

        let first_line: String = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .chars()
            .take(120)
            .collect();
        ActionResult::text(
            action_id,
            format!(
                "The local model cannot reason about this content in depth. \
                 It begins with:\n\n> {first_line}\n\n\
                 Configure a cloud provider for richer results."
            ),
        )
    }

    fn stream_json(payload: String, prompt_len: usize) -> ChunkStream {
        let usage = TokenUsage {
            input_tokens: prompt_len.saturating_div(4),
            output_tokens: payload.len().saturating_div(4),
        };
        let stream = stream! {
            let chars: Vec<char> = payload.chars().collect();
            for piece in chars.chunks(CHUNK_SIZE) {
                yield Ok::<_, crate::error::LlmError>(StreamChunk::Delta(piece.iter().collect()));
            }
            yield Ok(StreamChunk::Done { usage });
        };
        Box::pin(stream)
    }
}

/// Convert tab- or pipe-separated lines to comma-separated form.
fn to_csv(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let sep = if line.contains('\t') { '\t' } else { '|' };
        let cells: Vec<String> = line
            .split(sep)
            .map(|c| {
                let c = c.trim();
                if c.contains(',') || c.contains('"') {
                    format!("\"{}\"", c.replace('"', "\"\""))
                } else {
                    c.to_string()
                }
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

#[async_trait]
impl LlmProvider for LocalProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn label(&self) -> &str {
        "Local"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn stream_classify(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        let menu = Self::classify_text(Self::extracted_text(&request.user));
        let payload = serde_json::to_string(&menu)
            .unwrap_or_else(|_| serde_json::to_string(&fallback_menu()).unwrap_or_default());
        Ok(Self::stream_json(payload, request.user.len()))
    }

    async fn stream_execute(&self, request: &LlmRequest) -> LlmResult<ChunkStream> {
        let result = Self::execute_action(&request.user);
        let payload = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
        Ok(Self::stream_json(payload, request.user.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ChunkStream) -> (String, usize) {
        let mut text = String::new();
        let mut done = 0usize;
        while let Some(chunk) = stream.next().await {
            match chunk.unwrap() {
                StreamChunk::Delta(piece) => text.push_str(&piece),
                StreamChunk::Done { .. } => done = done.saturating_add(1),
            }
        }
        (text, done)
    }

    #[tokio::test]
    async fn classifies_an_error_trace() {
        let provider = LocalProvider::new();
        let user = format!(
            "PLATFORM: linux\n\n{EXTRACTED_TEXT_MARKER}Traceback (most recent call last):\n\
             ModuleNotFoundError: No module named 'panda'"
        );
        let stream = provider
            .stream_classify(&LlmRequest::new("sys", user))
            .await
            .unwrap();
        let (text, done) = collect(stream).await;
        assert_eq!(done, 1);

        let menu: ActionMenu = serde_json::from_str(&text).unwrap();
        assert_eq!(menu.content_type, ContentType::Error);
        assert!(menu.action("fix_error").is_some());
        assert!(menu.action("copy_text").is_some());
    }

    #[tokio::test]
    async fn classifies_a_table() {
        let provider = LocalProvider::new();
        let user = format!(
            "{EXTRACTED_TEXT_MARKER}Name\tRole\tSalary\nAlice\tEngineer\t150000\nBob\tManager\t180000"
        );
        let stream = provider
            .stream_classify(&LlmRequest::new("sys", user))
            .await
            .unwrap();
        let (text, _) = collect(stream).await;
        let menu: ActionMenu = serde_json::from_str(&text).unwrap();
        assert_eq!(menu.content_type, ContentType::Table);
        assert!(menu.action("export_csv").is_some());
    }

    #[tokio::test]
    async fn executes_csv_export() {
        let provider = LocalProvider::new();
        let user = format!(
            "{ACTION_MARKER}export_csv\n\n{EXTRACTED_TEXT_MARKER}Name\tRole\nAlice\tEngineer"
        );
        let stream = provider
            .stream_execute(&LlmRequest::new("sys", user))
            .await
            .unwrap();
        let (text, _) = collect(stream).await;
        let result: ActionResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result.status, ActionStatus::Success);
        match result.result_body {
            ResultBody::File {
                filename,
                content,
                mime,
            } => {
                assert_eq!(filename, "export.csv");
                assert_eq!(mime, "text/csv");
                assert_eq!(content, "Name,Role\nAlice,Engineer\n");
            },
            other => panic!("expected file body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_text_falls_back() {
        let provider = LocalProvider::new();
        let stream = provider
            .stream_classify(&LlmRequest::new("sys", EXTRACTED_TEXT_MARKER))
            .await
            .unwrap();
        let (text, _) = collect(stream).await;
        let menu: ActionMenu = serde_json::from_str(&text).unwrap();
        assert_eq!(menu.content_type, ContentType::Unknown);
        assert_eq!(menu.summary, "Could not analyze content");
    }

    #[test]
    fn local_is_not_remote() {
        assert!(!LocalProvider::new().is_remote());
    }

    #[test]
    fn csv_quotes_embedded_commas() {
        assert_eq!(to_csv("a\tb,c"), "a,\"b,c\"\n");
    }
}
