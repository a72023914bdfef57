//! Streaming partial-JSON skeleton extraction.
//!
//! The CLASSIFY stream is JSON, but the user should not wait for the
//! closing brace to see a menu title. After each chunk the extractor
//! runs a forgiving prefix scan: a character-level pass that tracks
//! string and depth state and captures completed top-level string
//! values. The first time both `contentType` and `summary` are
//! capturable, a [`Skeleton`] is emitted, exactly once per stream.
//!
//! The scanner is deliberately not a general JSON parser: it only needs
//! two top-level strings from a document that is still open.

use std::collections::HashMap;

use omni_glass_core::{ActionMenu, fallback_menu};

/// The early, partial publication of a forthcoming action menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    /// Raw `contentType` tag as the model wrote it.
    pub content_type: String,
    /// The one-line summary.
    pub summary: String,
}

/// Accumulates stream chunks and emits at most one skeleton.
#[derive(Debug, Default)]
pub struct SkeletonExtractor {
    buffer: String,
    emitted: bool,
}

impl SkeletonExtractor {
    /// Create an empty extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns the skeleton the first time both fields
    /// are simultaneously parseable from the buffered prefix.
    pub fn push(&mut self, chunk: &str) -> Option<Skeleton> {
        self.buffer.push_str(chunk);
        if self.emitted {
            return None;
        }

        let fields = top_level_strings(&self.buffer);
        let content_type = fields
            .get("contentType")
            .or_else(|| fields.get("content_type"))?;
        let summary = fields.get("summary")?;

        self.emitted = true;
        Some(Skeleton {
            content_type: content_type.clone(),
            summary: summary.clone(),
        })
    }

    /// Whether the skeleton was already delivered.
    #[must_use]
    pub fn emitted(&self) -> bool {
        self.emitted
    }

    /// The full buffered stream text.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Strictly parse the completed stream as an [`ActionMenu`],
    /// substituting the fallback menu when the document is unusable.
    ///
    /// Returns `(menu, parse_failed)` so the caller can log and annotate.
    #[must_use]
    pub fn finish(self) -> (ActionMenu, bool) {
        let cleaned = strip_code_fences(self.buffer.trim());
        match serde_json::from_str::<ActionMenu>(cleaned) {
            Ok(mut menu) if !menu.actions.is_empty() => {
                menu.normalize();
                (menu, false)
            },
            Ok(_) | Err(_) => (fallback_menu(), true),
        }
    }
}

/// Models occasionally wrap the document in a markdown fence despite
/// instructions; strip one before the strict parse.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim_end)
}

/// Scan a (possibly truncated) JSON object for completed top-level
/// `"key": "string"` pairs.
fn top_level_strings(buffer: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let chars: Vec<char> = buffer.chars().collect();
    let mut i = 0usize;
    let len = chars.len();

    // Find the opening brace.
    while i < len && chars[i] != '{' {
        i = i.saturating_add(1);
    }
    if i >= len {
        return fields;
    }
    i = i.saturating_add(1);

    loop {
        // Expect a key string (or the end of the object / buffer).
        i = skip_ws(&chars, i);
        if i >= len || chars[i] == '}' {
            return fields;
        }
        if chars[i] == ',' {
            i = i.saturating_add(1);
            continue;
        }
        if chars[i] != '"' {
            return fields;
        }
        let Some((key, after_key)) = parse_string(&chars, i) else {
            return fields;
        };
        i = skip_ws(&chars, after_key);
        if i >= len || chars[i] != ':' {
            return fields;
        }
        i = skip_ws(&chars, i.saturating_add(1));
        if i >= len {
            return fields;
        }

        if chars[i] == '"' {
            let Some((value, after_value)) = parse_string(&chars, i) else {
                // The value string is still streaming in.
                return fields;
            };
            fields.insert(key, value);
            i = after_value;
        } else {
            let Some(after_value) = skip_value(&chars, i) else {
                return fields;
            };
            i = after_value;
        }
    }
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i = i.saturating_add(1);
    }
    i
}

/// Parse a complete JSON string starting at the opening quote. Returns
/// the decoded value and the index after the closing quote, or `None`
/// when the string is still open.
fn parse_string(chars: &[char], start: usize) -> Option<(String, usize)> {
    debug_assert_eq!(chars.get(start), Some(&'"'));
    let mut out = String::new();
    let mut i = start.saturating_add(1);

    while i < chars.len() {
        match chars[i] {
            '"' => return Some((out, i.saturating_add(1))),
            '\\' => {
                let escaped = *chars.get(i.saturating_add(1))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let code: String = chars
                            .get(i.saturating_add(2)..i.saturating_add(6))?
                            .iter()
                            .collect();
                        if let Some(c) =
                            u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
                        {
                            out.push(c);
                        }
                        i = i.saturating_add(4);
                    },
                    other => out.push(other),
                }
                i = i.saturating_add(2);
            },
            c => {
                out.push(c);
                i = i.saturating_add(1);
            },
        }
    }
    None
}

/// Skip one complete non-string JSON value (number, bool, null, object,
/// or array). Returns the index after the value, or `None` when the
/// value is still streaming in.
fn skip_value(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '{' | '[' => depth = depth.saturating_add(1),
            '}' | ']' => {
                if depth == 0 {
                    // End of the enclosing object; the value (a bare
                    // literal) ended just before.
                    return Some(i);
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i.saturating_add(1));
                }
            },
            '"' => {
                let (_, after) = parse_string(chars, i)?;
                i = after;
                continue;
            },
            ',' if depth == 0 => return Some(i),
            _ => {},
        }
        i = i.saturating_add(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_glass_core::ContentType;

    const FULL_MENU: &str = r#"{
        "contentType": "error",
        "confidence": 0.93,
        "summary": "Python import error",
        "actions": [
            {"id": "fix_error", "label": "Fix Error", "priority": 1,
             "requiresExecution": true}
        ]
    }"#;

    #[test]
    fn skeleton_emerges_from_a_prefix() {
        let mut extractor = SkeletonExtractor::new();
        assert!(extractor.push("{\"contentType\": \"err").is_none());
        assert!(extractor.push("or\", \"confidence\": 0.93, ").is_none());
        let skeleton = extractor
            .push("\"summary\": \"Python import error\", \"actions\": [")
            .unwrap();
        assert_eq!(skeleton.content_type, "error");
        assert_eq!(skeleton.summary, "Python import error");
    }

    #[test]
    fn skeleton_is_emitted_exactly_once() {
        let mut extractor = SkeletonExtractor::new();
        let mut emissions = 0usize;
        for chunk in FULL_MENU.as_bytes().chunks(7) {
            if extractor.push(std::str::from_utf8(chunk).unwrap()).is_some() {
                emissions = emissions.saturating_add(1);
            }
        }
        assert_eq!(emissions, 1);
        assert!(extractor.emitted());
    }

    #[test]
    fn no_skeleton_without_both_fields() {
        let mut extractor = SkeletonExtractor::new();
        assert!(
            extractor
                .push("{\"contentType\": \"error\", \"confidence\": 0.9}")
                .is_none()
        );
    }

    #[test]
    fn no_skeleton_for_garbage() {
        let mut extractor = SkeletonExtractor::new();
        assert!(extractor.push("I think this looks like an error").is_none());
        let (menu, failed) = extractor.finish();
        assert!(failed);
        assert_eq!(menu.content_type, ContentType::Unknown);
        assert_eq!(menu.summary, "Could not analyze content");
    }

    #[test]
    fn snake_case_key_is_accepted() {
        let mut extractor = SkeletonExtractor::new();
        let skeleton = extractor
            .push("{\"content_type\": \"table\", \"summary\": \"A table\"")
            .unwrap();
        assert_eq!(skeleton.content_type, "table");
    }

    #[test]
    fn summary_before_content_type_still_works() {
        let mut extractor = SkeletonExtractor::new();
        let skeleton = extractor
            .push("{\"summary\": \"A table\", \"contentType\": \"table\",")
            .unwrap();
        assert_eq!(skeleton.summary, "A table");
    }

    #[test]
    fn nested_strings_do_not_leak_to_top_level() {
        let mut extractor = SkeletonExtractor::new();
        // "summary" appears inside a nested object; only depth-1 keys count.
        assert!(
            extractor
                .push("{\"meta\": {\"summary\": \"nested\"}, \"contentType\": \"prose\"")
                .is_none()
        );
        let skeleton = extractor.push(", \"summary\": \"real\"").unwrap();
        assert_eq!(skeleton.summary, "real");
    }

    #[test]
    fn escaped_quotes_inside_values_are_handled() {
        let mut extractor = SkeletonExtractor::new();
        let skeleton = extractor
            .push("{\"contentType\": \"prose\", \"summary\": \"He said \\\"hi\\\" loudly\"")
            .unwrap();
        assert_eq!(skeleton.summary, "He said \"hi\" loudly");
    }

    #[test]
    fn half_open_value_string_does_not_emit() {
        let mut extractor = SkeletonExtractor::new();
        assert!(
            extractor
                .push("{\"contentType\": \"prose\", \"summary\": \"still stream")
                .is_none()
        );
        assert!(extractor.push("ing\"").is_some());
    }

    #[test]
    fn finish_parses_the_complete_document() {
        let mut extractor = SkeletonExtractor::new();
        extractor.push(FULL_MENU);
        let (menu, failed) = extractor.finish();
        assert!(!failed);
        assert_eq!(menu.content_type, ContentType::Error);
        assert!(menu.action("fix_error").is_some());
        assert!(menu.action("copy_text").is_some());
    }

    #[test]
    fn fenced_document_still_parses() {
        let mut extractor = SkeletonExtractor::new();
        extractor.push(&format!("```json\n{FULL_MENU}\n```"));
        let (menu, failed) = extractor.finish();
        assert!(!failed);
        assert_eq!(menu.content_type, ContentType::Error);
    }

    #[test]
    fn empty_action_list_falls_back() {
        let mut extractor = SkeletonExtractor::new();
        extractor.push(r#"{"contentType": "prose", "summary": "s", "actions": []}"#);
        let (menu, failed) = extractor.finish();
        assert!(failed);
        assert!(!menu.actions.is_empty());
    }
}
