//! The tool registry.
//!
//! One mapping from qualified name (`"<plugin_id>:<tool_name>"`) to
//! entry, guarded by an async mutex because registration can suspend
//! while the lock is held. Built-ins register first; plugin tools arrive
//! after their handshake. Dispatch resolution returns a cloned target so
//! no caller performs plugin I/O while holding the lock.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use omni_glass_core::{BUILTIN_PLUGIN_ID, ToolDescriptor, qualified_name};

/// Where a resolved action is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolTarget {
    /// A host action that goes through the EXECUTE model role.
    Builtin,
    /// A plugin tool dispatched over MCP.
    Plugin {
        /// Owning plugin id.
        plugin_id: String,
        /// Unqualified tool name sent in `tools/call`.
        tool_name: String,
    },
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// The advertised descriptor.
    pub descriptor: ToolDescriptor,
    /// Dispatch target.
    pub target: ToolTarget,
}

/// The built-in actions every installation offers. Local actions
/// (`copy_text`, `search_web`) are listed so classify can offer them;
/// they never reach EXECUTE.
fn builtin_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "copy_text")
            .with_description("Copy the extracted text to the clipboard"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "search_web")
            .with_description("Search the web for the extracted text"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "explain")
            .with_description("Explain what this content means"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "summarize")
            .with_description("Summarize this content"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "fix_error")
            .with_description("Suggest a command that fixes this error"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "export_csv")
            .with_description("Convert the table to a CSV file"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "extract_data")
            .with_description("Extract the key facts from this content"),
        ToolDescriptor::new(BUILTIN_PLUGIN_ID, "translate")
            .with_description("Translate this content"),
    ]
}

/// The registry. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Mutex<HashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    /// Create a registry pre-populated with the built-in actions.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut tools = HashMap::new();
        for descriptor in builtin_descriptors() {
            tools.insert(
                descriptor.qualified_name(),
                RegisteredTool {
                    descriptor,
                    target: ToolTarget::Builtin,
                },
            );
        }
        Self {
            tools: Mutex::new(tools),
        }
    }

    /// Register the tools a plugin discovered during its handshake.
    pub async fn register_plugin_tools(&self, descriptors: Vec<ToolDescriptor>) {
        let mut tools = self.tools.lock().await;
        for descriptor in descriptors {
            let qualified = descriptor.qualified_name();
            info!(tool = %qualified, "registered plugin tool");
            tools.insert(
                qualified,
                RegisteredTool {
                    target: ToolTarget::Plugin {
                        plugin_id: descriptor.plugin_id.clone(),
                        tool_name: descriptor.tool_name.clone(),
                    },
                    descriptor,
                },
            );
        }
    }

    /// Drop every tool belonging to one plugin. Built-ins and other
    /// plugins are untouched.
    pub async fn remove_plugin(&self, plugin_id: &str) {
        let mut tools = self.tools.lock().await;
        let before = tools.len();
        tools.retain(|_, t| t.descriptor.plugin_id != plugin_id);
        debug!(
            plugin_id = %plugin_id,
            removed = before.saturating_sub(tools.len()),
            "removed plugin tools"
        );
    }

    /// Every action id the classifier may offer: built-ins by bare name,
    /// plugin tools by qualified name, in stable order.
    pub async fn permitted_action_ids(&self) -> Vec<String> {
        let tools = self.tools.lock().await;
        let mut ids: Vec<String> = tools
            .values()
            .map(|t| {
                if t.descriptor.is_builtin() {
                    t.descriptor.tool_name.clone()
                } else {
                    t.descriptor.qualified_name()
                }
            })
            .collect();
        ids.sort();
        ids
    }

    /// Serialize the non-trivial tool descriptions for the CLASSIFY
    /// prompt.
    pub async fn prompt_block(&self) -> String {
        let tools = self.tools.lock().await;
        let mut entries: Vec<&RegisteredTool> = tools
            .values()
            .filter(|t| !t.descriptor.is_builtin())
            .collect();
        entries.sort_by(|a, b| {
            a.descriptor
                .qualified_name()
                .cmp(&b.descriptor.qualified_name())
        });

        let mut block = String::new();
        for tool in entries {
            block.push_str(&format!(
                "- {}: {} (schema: {})\n",
                tool.descriptor.qualified_name(),
                tool.descriptor.description,
                tool.descriptor.input_schema,
            ));
        }
        block
    }

    /// Resolve an action id to its dispatch target.
    ///
    /// Bare ids resolve against the built-in namespace; qualified ids
    /// resolve directly.
    pub async fn resolve(&self, action_id: &str) -> Option<RegisteredTool> {
        let tools = self.tools.lock().await;
        let key = if action_id.contains(':') {
            action_id.to_string()
        } else {
            qualified_name(BUILTIN_PLUGIN_ID, action_id)
        };
        tools.get(&key).cloned()
    }

    /// Whether an action id is currently offerable.
    pub async fn is_known(&self, action_id: &str) -> bool {
        self.resolve(action_id).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn builtins_resolve_by_bare_name() {
        let registry = ToolRegistry::with_builtins();
        let tool = registry.resolve("fix_error").await.unwrap();
        assert_eq!(tool.target, ToolTarget::Builtin);
        assert_eq!(tool.descriptor.qualified_name(), "builtin:fix_error");
    }

    #[tokio::test]
    async fn plugin_tools_resolve_by_qualified_name() {
        let registry = ToolRegistry::with_builtins();
        registry
            .register_plugin_tools(vec![
                ToolDescriptor::new("com.example.jira", "create_ticket")
                    .with_description("Create a ticket")
                    .with_schema(json!({"type": "object"})),
            ])
            .await;

        let tool = registry
            .resolve("com.example.jira:create_ticket")
            .await
            .unwrap();
        assert_eq!(
            tool.target,
            ToolTarget::Plugin {
                plugin_id: "com.example.jira".to_string(),
                tool_name: "create_ticket".to_string(),
            }
        );
        assert!(registry.is_known("com.example.jira:create_ticket").await);
    }

    #[tokio::test]
    async fn unqualified_collisions_are_namespaced() {
        let registry = ToolRegistry::with_builtins();
        registry
            .register_plugin_tools(vec![
                ToolDescriptor::new("com.a", "ping"),
                ToolDescriptor::new("com.b", "ping"),
            ])
            .await;

        assert!(registry.resolve("com.a:ping").await.is_some());
        assert!(registry.resolve("com.b:ping").await.is_some());
        assert!(registry.resolve("ping").await.is_none());
    }

    #[tokio::test]
    async fn removing_a_plugin_keeps_everything_else() {
        let registry = ToolRegistry::with_builtins();
        registry
            .register_plugin_tools(vec![
                ToolDescriptor::new("com.a", "ping"),
                ToolDescriptor::new("com.b", "pong"),
            ])
            .await;

        registry.remove_plugin("com.a").await;

        assert!(registry.resolve("com.a:ping").await.is_none());
        assert!(registry.resolve("com.b:pong").await.is_some());
        assert!(registry.resolve("copy_text").await.is_some());
    }

    #[tokio::test]
    async fn prompt_block_lists_plugin_tools_only() {
        let registry = ToolRegistry::with_builtins();
        registry
            .register_plugin_tools(vec![
                ToolDescriptor::new("com.a", "ping").with_description("Ping"),
            ])
            .await;

        let block = registry.prompt_block().await;
        assert!(block.contains("com.a:ping"));
        assert!(!block.contains("builtin:"));
    }

    #[tokio::test]
    async fn permitted_ids_mix_bare_and_qualified() {
        let registry = ToolRegistry::with_builtins();
        registry
            .register_plugin_tools(vec![ToolDescriptor::new("com.a", "ping")])
            .await;

        let ids = registry.permitted_action_ids().await;
        assert!(ids.contains(&"copy_text".to_string()));
        assert!(ids.contains(&"com.a:ping".to_string()));
        assert!(!ids.contains(&"builtin:copy_text".to_string()));
    }
}
