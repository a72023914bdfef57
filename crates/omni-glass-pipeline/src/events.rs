//! Checkpoint events published to the UI collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use omni_glass_core::{ActionMenu, ActionResult};

/// Events a pipeline session publishes, in order. The skeleton strictly
/// precedes the complete menu; across sessions no ordering is
/// guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Early partial menu: enough to render a useful title.
    Skeleton {
        /// Session that produced it.
        session_id: Uuid,
        /// Raw content-type tag from the stream prefix.
        content_type: String,
        /// One-line summary.
        summary: String,
    },
    /// The complete, normalized action menu.
    MenuReady {
        /// Session that produced it.
        session_id: Uuid,
        /// The menu.
        menu: ActionMenu,
    },
    /// Sensitive content was replaced before a remote call; the UI
    /// annotates the menu.
    RedactionApplied {
        /// Session the annotation belongs to.
        session_id: Uuid,
        /// Labels that fired.
        labels: Vec<String>,
    },
    /// An EXECUTE round-trip began for the selected action.
    ExecuteStarted {
        /// Session executing.
        session_id: Uuid,
        /// Selected action.
        action_id: String,
    },
    /// The action result is ready for dispatch.
    ResultReady {
        /// Session that finished.
        session_id: Uuid,
        /// The result.
        result: ActionResult,
    },
    /// The session failed; `retryable` distinguishes transient faults.
    SessionFailed {
        /// Session that failed.
        session_id: Uuid,
        /// Human-readable message for the toast.
        message: String,
        /// Whether a retry hint should be shown.
        retryable: bool,
    },
}

impl PipelineEvent {
    /// The session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::Skeleton { session_id, .. }
            | Self::MenuReady { session_id, .. }
            | Self::RedactionApplied { session_id, .. }
            | Self::ExecuteStarted { session_id, .. }
            | Self::ResultReady { session_id, .. }
            | Self::SessionFailed { session_id, .. } => *session_id,
        }
    }
}
