//! Pipeline phase tracking.

use serde::{Deserialize, Serialize};

/// Where a pipeline session currently is.
///
/// ```text
/// ocr → classify → await_click → execute → done
///          ↓                        ↓
///       failed                   failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Waiting on the OCR collaborator.
    Ocr,
    /// Streaming the CLASSIFY response.
    Classify,
    /// Menu published; waiting for the user to pick an action.
    AwaitClick,
    /// Streaming the EXECUTE response or dispatching a tool call.
    Execute,
    /// Terminal: result delivered.
    Done,
    /// Terminal: the session failed.
    Failed,
}

impl PipelinePhase {
    /// Whether the session has finished (successfully or not).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}
