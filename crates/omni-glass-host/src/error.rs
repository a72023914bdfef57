//! Host-surface error types.

use thiserror::Error;

/// Result alias for host commands.
pub type HostResult<T> = Result<T, HostError>;

/// Structured errors returned to the UI collaborator.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(String),

    /// No snip or typed command has produced a session yet.
    #[error("no active session")]
    NoActiveSession,

    /// The clipboard is unavailable.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// The requested plugin is not installed.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A pipeline failure; carries the taxonomy from the pipeline crate.
    #[error(transparent)]
    Pipeline(#[from] omni_glass_pipeline::PipelineError),

    /// A plugin subsystem failure.
    #[error(transparent)]
    Plugin(#[from] omni_glass_plugins::PluginError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
