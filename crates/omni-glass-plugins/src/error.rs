//! Plugin subsystem error types.

use thiserror::Error;

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors produced while loading, supervising, or talking to plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The manifest file could not be read or parsed.
    #[error("invalid manifest at {path}: {reason}")]
    InvalidManifest {
        /// Manifest path.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// The manifest declares a runtime this host cannot run.
    #[error("unsupported runtime tag: {0}")]
    UnsupportedRuntime(String),

    /// The declared runtime binary is not installed.
    #[error("runtime binary not found: {0}")]
    RuntimeNotFound(String),

    /// The plugin is not approved (or its approval is stale).
    #[error("plugin not approved: {plugin_id}")]
    NotApproved {
        /// Plugin id.
        plugin_id: String,
    },

    /// The plugin process could not be spawned.
    #[error("failed to spawn plugin {plugin_id}: {reason}")]
    SpawnFailed {
        /// Plugin id.
        plugin_id: String,
        /// Underlying reason.
        reason: String,
    },

    /// The MCP handshake failed.
    #[error("handshake with plugin {plugin_id} failed: {reason}")]
    HandshakeFailed {
        /// Plugin id.
        plugin_id: String,
        /// Underlying reason.
        reason: String,
    },

    /// A tool call exceeded the per-call timeout.
    #[error("tool call {tool} on plugin {plugin_id} timed out after {timeout_secs}s")]
    CallTimeout {
        /// Plugin id.
        plugin_id: String,
        /// Unqualified tool name.
        tool: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// The plugin broke the wire protocol; it is faulted and terminated.
    #[error("protocol error from plugin {plugin_id}: {reason}")]
    Protocol {
        /// Plugin id.
        plugin_id: String,
        /// What was malformed.
        reason: String,
    },

    /// The plugin answered with a JSON-RPC error object.
    #[error("plugin {plugin_id} returned error {code}: {message}")]
    Rpc {
        /// Plugin id.
        plugin_id: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The plugin process is gone.
    #[error("plugin {plugin_id} is not live")]
    NotLive {
        /// Plugin id.
        plugin_id: String,
    },

    /// Sandbox profile generation failed.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
