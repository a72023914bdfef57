//! Snip context types produced by the capture/OCR collaborators.

use serde::{Deserialize, Serialize};

/// OCR recognition level used for a snip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevel {
    /// Lower-latency recognition pass.
    Fast,
    /// Higher-accuracy recognition pass.
    Accurate,
}

/// The bundle produced by the capture collaborator for one screen region.
///
/// Immutable after creation; the pipeline only ever reads from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipContext {
    /// Text extracted by OCR (UTF-8).
    pub text: String,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f64,
    /// Recognition level the OCR collaborator used.
    pub recognition_level: RecognitionLevel,
    /// Platform tag (e.g. `"macos"`, `"linux"`, `"windows"`).
    pub platform: String,
    /// Screen coordinates for positioning the action menu.
    pub anchor: (f64, f64),
    /// Frontmost application at capture time, if the collaborator knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
}

impl SnipContext {
    /// Create a snip context from extracted text, with current-platform
    /// defaults for the remaining fields.
    pub fn from_text(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            recognition_level: RecognitionLevel::Accurate,
            platform: std::env::consts::OS.to_string(),
            anchor: (0.0, 0.0),
            source_app: None,
        }
    }

    /// Set the anchor point.
    #[must_use]
    pub fn with_anchor(mut self, x: f64, y: f64) -> Self {
        self.anchor = (x, y);
        self
    }

    /// Set the source application.
    #[must_use]
    pub fn with_source_app(mut self, app: impl Into<String>) -> Self {
        self.source_app = Some(app.into());
        self
    }
}

/// Structure flags computed from the extracted text.
///
/// Both flags feed the CLASSIFY prompt so the model can lean toward
/// `table` / `code` content types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFlags {
    /// At least three consecutive lines share the same non-zero count of
    /// tab or pipe separators.
    pub has_table_structure: bool,
    /// The text looks like source code (keywords, braces, or statement
    /// terminators).
    pub has_code_structure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let snip = SnipContext::from_text("hello", 1.7);
        assert!((snip.confidence - 1.0).abs() < f64::EPSILON);

        let snip = SnipContext::from_text("hello", -0.2);
        assert!(snip.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn builder_sets_fields() {
        let snip = SnipContext::from_text("x", 0.9)
            .with_anchor(120.0, 48.5)
            .with_source_app("Terminal");
        assert_eq!(snip.anchor, (120.0, 48.5));
        assert_eq!(snip.source_app.as_deref(), Some("Terminal"));
    }

    #[test]
    fn recognition_level_serde_tags() {
        let json = serde_json::to_string(&RecognitionLevel::Fast).unwrap();
        assert_eq!(json, "\"fast\"");
    }
}
