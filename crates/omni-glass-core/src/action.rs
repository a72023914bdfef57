//! Action and action-menu types: the structured output of CLASSIFY.

use serde::{Deserialize, Serialize};

/// Closed tag set describing what kind of content a snip contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// An error message or stack trace.
    Error,
    /// Source code.
    Code,
    /// Tabular data.
    Table,
    /// A bulleted or numbered list.
    List,
    /// Plain prose.
    Prose,
    /// Key/value pairs (settings, headers, env output).
    KvPairs,
    /// A mixture of the above.
    Mixed,
    /// Unrecognized content. Also the catch-all for unexpected model tags.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ContentType {
    /// The wire tag for this content type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Code => "code",
            Self::Table => "table",
            Self::List => "list",
            Self::Prose => "prose",
            Self::KvPairs => "kv_pairs",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

/// One contextual offer presented to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Stable identifier (e.g. `"fix_error"`, `"my.plugin:ping"`).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Icon tag for the UI.
    #[serde(default)]
    pub icon: String,
    /// Rank, ascending: priority 1 sorts above priority 2.
    #[serde(default)]
    pub priority: i32,
    /// Human description of what the action does.
    #[serde(default)]
    pub description: String,
    /// Whether the action needs a second LLM call (EXECUTE). Actions with
    /// `false` are handled locally (copy, search).
    #[serde(default, alias = "requires_execution")]
    pub requires_execution: bool,
}

impl Action {
    /// Create an action with a label, defaulting the remaining fields.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            icon: String::new(),
            priority: 0,
            description: String::new(),
            requires_execution: false,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the icon tag.
    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the action as requiring an EXECUTE round-trip.
    #[must_use]
    pub fn requires_execution(mut self) -> Self {
        self.requires_execution = true;
        self
    }
}

/// The structured result of CLASSIFY: what the content is and what the
/// user can do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMenu {
    /// Detected content type.
    #[serde(alias = "content_type")]
    pub content_type: ContentType,
    /// Classifier confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    /// Short human sentence describing the content.
    pub summary: String,
    /// Detected programming language, when `content_type` is code-like.
    #[serde(
        default,
        alias = "detected_language",
        skip_serializing_if = "Option::is_none"
    )]
    pub detected_language: Option<String>,
    /// Ordered offers. Invariant: never empty after [`ActionMenu::normalize`].
    pub actions: Vec<Action>,
    /// Labels of redactions applied to the outbound prompt, surfaced so the
    /// UI can annotate the menu.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redaction_notices: Vec<String>,
}

impl ActionMenu {
    /// Sort actions into their presentation order and guarantee the menu
    /// invariants: at least one action, `copy_text` always present, and a
    /// total order under (priority, id).
    pub fn normalize(&mut self) {
        if !self.actions.iter().any(|a| a.id == "copy_text") {
            self.actions.push(
                Action::new("copy_text", "Copy Text")
                    .icon("clipboard")
                    .priority(i32::MAX)
                    .description("Copy the extracted text to the clipboard"),
            );
        }
        self.actions
            .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    /// Look up an action by id.
    #[must_use]
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }
}

/// The constant menu substituted when CLASSIFY output cannot be parsed.
///
/// Guarantees the non-empty-menu invariant: `copy_text`, `explain`, and
/// `search_web` are always offerable regardless of content.
#[must_use]
pub fn fallback_menu() -> ActionMenu {
    let mut menu = ActionMenu {
        content_type: ContentType::Unknown,
        confidence: 0.0,
        summary: "Could not analyze content".to_string(),
        detected_language: None,
        actions: vec![
            Action::new("copy_text", "Copy Text")
                .icon("clipboard")
                .priority(1)
                .description("Copy the extracted text to the clipboard"),
            Action::new("explain", "Explain This")
                .icon("sparkles")
                .priority(2)
                .description("Explain what this content means")
                .requires_execution(),
            Action::new("search_web", "Search Web")
                .icon("magnifier")
                .priority(3)
                .description("Search the web for the extracted text"),
        ],
        redaction_notices: Vec::new(),
    };
    menu.normalize();
    menu
}
