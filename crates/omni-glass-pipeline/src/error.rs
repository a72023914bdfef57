//! Pipeline error types, organised along the error taxonomy: transient,
//! parse, policy, plugin, and user classes each get distinct
//! user-visible behaviour.

use thiserror::Error;

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the pipeline orchestrator and dispatcher.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transient transport failure; surface a retry hint, never retry
    /// automatically.
    #[error("provider stream failed: {0}")]
    Transient(String),

    /// The model produced unparseable output for EXECUTE. (CLASSIFY
    /// parse failures substitute the fallback menu instead.)
    #[error("could not parse model output: {0}")]
    Parse(String),

    /// The command blocklist refused execution.
    #[error("command blocked: {reason}")]
    CommandBlocked {
        /// Human-readable blocklist reason, shown verbatim.
        reason: String,
    },

    /// No such session.
    #[error("unknown session: {0}")]
    UnknownSession(uuid::Uuid),

    /// The action id is neither built-in nor registered.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The session is not in a phase that allows the operation.
    #[error("session is in phase {phase}, expected {expected}")]
    WrongPhase {
        /// Current phase tag.
        phase: String,
        /// Required phase tag.
        expected: String,
    },

    /// OCR produced nothing usable.
    #[error("no usable text in the captured region")]
    EmptySnip,

    /// A plugin-side failure; the plugin's tools are dropped and the
    /// pipeline continues.
    #[error(transparent)]
    Plugin(#[from] omni_glass_plugins::PluginError),

    /// Underlying I/O failure (file results, shell spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Map a transport error into the pipeline taxonomy.
    #[must_use]
    pub fn from_llm(e: &omni_glass_llm::LlmError) -> Self {
        if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Parse(e.to_string())
        }
    }
}
