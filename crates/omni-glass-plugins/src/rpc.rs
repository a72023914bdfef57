//! JSON-RPC 2.0 envelopes, NDJSON-framed.
//!
//! Every inter-process message is one JSON object per newline-terminated
//! line on the plugin's stdin/stdout, with no length prefix. Requests use
//! monotonically increasing integer ids; notifications omit the id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version sent in the `initialize` handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// An outbound request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request expecting a response with the same id.
    #[must_use]
    pub fn call(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Build a notification (no id, no response expected).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// An inbound response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request this answers.
    pub id: Option<u64>,
    /// Result, mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error, mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The `tools/call` result shape a plugin returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content blocks; the host concatenates the text blocks.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Whether the call failed inside the plugin.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Concatenate all text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One content block inside a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContent {
    /// Block type; the host only interprets `"text"`.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text payload.
    #[serde(default)]
    pub text: String,
}

impl ToolContent {
    /// A text block.
    #[must_use]
    pub fn text_block(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// A tool advertised by a plugin in `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTool {
    /// Unqualified tool name.
    pub name: String,
    /// Description for the classifier.
    #[serde(default)]
    pub description: String,
    /// Input JSON schema.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_omits_id() {
        let n = RpcRequest::notification("notifications/initialized", None);
        let wire = serde_json::to_string(&n).unwrap();
        assert!(!wire.contains("\"id\""));
        assert!(!wire.contains("params"));
    }

    #[test]
    fn call_carries_id_and_params() {
        let c = RpcRequest::call(7, "tools/call", Some(json!({"name": "ping"})));
        let wire = serde_json::to_value(&c).unwrap();
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["params"]["name"], "ping");
    }

    #[test]
    fn tool_result_concatenates_text() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "pong"},
                {"type": "text", "text": "again"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.text(), "pong\nagain");
        assert!(!result.is_error);
    }

    #[test]
    fn remote_tool_parses_camel_case_schema_key() {
        let tool: RemoteTool = serde_json::from_value(json!({
            "name": "ping",
            "description": "Reply with pong",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(tool.name, "ping");
        assert_eq!(tool.input_schema["type"], "object");
    }
}
