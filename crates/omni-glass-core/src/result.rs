//! Action-result types: the structured output of EXECUTE.

use serde::{Deserialize, Serialize};

/// Outcome status of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The action completed and `result_body` holds its output.
    Success,
    /// The action failed; `result_body` carries a human-readable message.
    Error,
    /// The result is a shell command awaiting user confirmation.
    NeedsConfirmation,
}

/// The tagged payload of an action result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultBody {
    /// Markdown rendered inline in the action menu.
    Text {
        /// Markdown content.
        text: String,
    },
    /// A file the user can save.
    File {
        /// Suggested filename (with extension).
        filename: String,
        /// File content.
        content: String,
        /// MIME type.
        mime: String,
    },
    /// A shell command. Mandatorily paired with
    /// [`ActionStatus::NeedsConfirmation`].
    Command {
        /// The literal command string. Shown byte-identical in the
        /// confirmation dialog and passed unmodified to the shell.
        command: String,
        /// The model's human rationale for the command.
        rationale: String,
    },
    /// Text copied to the clipboard silently.
    Clipboard {
        /// Clipboard payload.
        text: String,
    },
}

impl ResultBody {
    /// The wire tag of this body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File { .. } => "file",
            Self::Command { .. } => "command",
            Self::Clipboard { .. } => "clipboard",
        }
    }
}

/// Token usage recorded for one LLM round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: usize,
    /// Completion tokens.
    pub output_tokens: usize,
}

impl TokenUsage {
    /// Total tokens for the round-trip.
    #[must_use]
    pub fn total(&self) -> usize {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Accumulate another round-trip's usage.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Optional metadata attached to a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Token usage for the EXECUTE round-trip, when one happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Free-form note (e.g. the blocklist reason for a converted result).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The structured result of EXECUTE for one selected action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Outcome status.
    pub status: ActionStatus,
    /// The action this result answers.
    #[serde(alias = "action_id")]
    pub action_id: String,
    /// Tagged payload.
    #[serde(alias = "result_body")]
    pub result_body: ResultBody,
    /// Optional metadata.
    #[serde(default)]
    pub meta: ResultMeta,
}

impl ActionResult {
    /// A successful text result.
    pub fn text(action_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Success,
            action_id: action_id.into(),
            result_body: ResultBody::Text { text: text.into() },
            meta: ResultMeta::default(),
        }
    }

    /// An error result with a human-readable message.
    pub fn error(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Error,
            action_id: action_id.into(),
            result_body: ResultBody::Text {
                text: message.into(),
            },
            meta: ResultMeta::default(),
        }
    }

    /// Attach token usage.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.meta.usage = Some(usage);
        self
    }

    /// Attach a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.meta.note = Some(note.into());
        self
    }

    /// Whether the wire-form invariant holds: a `command` body must carry
    /// `needs_confirmation` status (or have been converted to an error).
    #[must_use]
    pub fn command_pairing_is_valid(&self) -> bool {
        match &self.result_body {
            ResultBody::Command { .. } => {
                matches!(
                    self.status,
                    ActionStatus::NeedsConfirmation | ActionStatus::Error
                )
            },
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_body_round_trips_tagged_form() {
        let body = ResultBody::File {
            filename: "table.csv".into(),
            content: "a,b\n1,2\n".into(),
            mime: "text/csv".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "file");
        let parsed: ResultBody = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, body);
    }

    #[test]
    fn command_pairing_invariant() {
        let ok = ActionResult {
            status: ActionStatus::NeedsConfirmation,
            action_id: "fix_error".into(),
            result_body: ResultBody::Command {
                command: "pip install pandas".into(),
                rationale: "Installs the missing module".into(),
            },
            meta: ResultMeta::default(),
        };
        assert!(ok.command_pairing_is_valid());

        let bad = ActionResult {
            status: ActionStatus::Success,
            ..ok
        };
        assert!(!bad.command_pairing_is_valid());
    }

    #[test]
    fn usage_saturates() {
        let mut usage = TokenUsage {
            input_tokens: usize::MAX,
            output_tokens: 1,
        };
        usage.add(TokenUsage {
            input_tokens: 10,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, usize::MAX);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn parses_model_emitted_result() {
        let result: ActionResult = serde_json::from_str(
            r#"{
                "status": "needs_confirmation",
                "actionId": "fix_error",
                "resultBody": {
                    "kind": "command",
                    "command": "pip install pandas",
                    "rationale": "The module 'pandas' is not installed."
                }
            }"#,
        )
        .unwrap();
        assert_eq!(result.status, ActionStatus::NeedsConfirmation);
        assert_eq!(result.result_body.kind(), "command");
    }
}
