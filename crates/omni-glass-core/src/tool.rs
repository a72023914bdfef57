//! Tool descriptors and qualified tool names.
//!
//! Every invokable, built-in or plugin-provided, is advertised to the
//! classifier as a [`ToolDescriptor`]. Qualified names
//! (`"<plugin_id>:<tool_name>"`) are globally unique registry keys;
//! unqualified names collide freely across plugins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plugin id reserved for tools implemented by the host itself.
pub const BUILTIN_PLUGIN_ID: &str = "builtin";

/// A registry entry describing one invokable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Owning plugin id, or [`BUILTIN_PLUGIN_ID`].
    pub plugin_id: String,
    /// Unqualified tool name.
    pub tool_name: String,
    /// Human description advertised to the classifier.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema.
    pub fn new(plugin_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            tool_name: tool_name.into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// The globally-unique registry key for this tool.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.plugin_id, &self.tool_name)
    }

    /// Whether the tool is implemented by the host.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.plugin_id == BUILTIN_PLUGIN_ID
    }
}

/// Build a qualified tool name.
#[must_use]
pub fn qualified_name(plugin_id: &str, tool_name: &str) -> String {
    format!("{plugin_id}:{tool_name}")
}

/// Split a qualified name into `(plugin_id, tool_name)`.
#[must_use]
pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_round_trip() {
        let tool = ToolDescriptor::new("com.example.jira", "create_ticket");
        assert_eq!(tool.qualified_name(), "com.example.jira:create_ticket");
        assert_eq!(
            split_qualified_name(&tool.qualified_name()),
            Some(("com.example.jira", "create_ticket"))
        );
    }

    #[test]
    fn builtin_detection() {
        assert!(ToolDescriptor::new(BUILTIN_PLUGIN_ID, "explain").is_builtin());
        assert!(!ToolDescriptor::new("com.example.x", "explain").is_builtin());
    }

    #[test]
    fn unqualified_names_do_not_split() {
        assert_eq!(split_qualified_name("copy_text"), None);
    }
}
