//! Dangerous-command blocklist.
//!
//! Consulted twice per command result: once on the string the model
//! proposed (before the user ever sees a Run button) and once on the
//! string the user confirmed, immediately before the shell spawn.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dangerous shell patterns with the reason shown to the user on a hit.
static BLOCKLIST: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\brm\s+-[a-z]*[rf][a-z]*(\s+-[a-z-]+)*\s+(/|~)/?(\s|$|[;&|])")
                .unwrap(),
            "recursively deletes the filesystem root or home directory",
        ),
        (
            Regex::new(r"(?i)\bmkfs(\.[a-z0-9]+)?\b").unwrap(),
            "reformats a filesystem",
        ),
        (
            Regex::new(r"(?i)\bdd\b.*\bof=/dev/").unwrap(),
            "writes directly to a raw device",
        ),
        (
            Regex::new(r">\s*/dev/(sd|hd|nvme|disk)").unwrap(),
            "writes directly to a raw device",
        ),
        (
            Regex::new(r":\(\)\s*\{.*\|.*&.*\}\s*;?\s*:").unwrap(),
            "is a fork bomb",
        ),
        (
            Regex::new(r"(?i)\bchmod\s+(-[a-z]+\s+)*777\s+/\s*($|[;&|])").unwrap(),
            "makes the filesystem root world-writable",
        ),
        (
            Regex::new(r"(?i)\b(curl|wget)\b[^|;]*\|\s*(sudo\s+)?(ba|z|da|fi)?sh\b").unwrap(),
            "pipes a remote download into a shell",
        ),
        (
            Regex::new(r"(?i)\b(shutdown|reboot|halt|poweroff)\b").unwrap(),
            "shuts down or restarts the machine",
        ),
        (
            Regex::new(r"(?i)\bpasswd\b").unwrap(),
            "changes an account password",
        ),
        (
            Regex::new(r"(?i)\bsudo\s+su\b").unwrap(),
            "escalates to a root shell",
        ),
        (
            Regex::new(r"(?i)\beval\b").unwrap(),
            "evaluates a dynamically-built command",
        ),
        (
            Regex::new(r"(?i)\bnet\s+user\b").unwrap(),
            "modifies Windows user accounts",
        ),
        (
            Regex::new(r"(?i)\b(reg\s+(add|delete)|regedit)\b").unwrap(),
            "modifies the Windows registry",
        ),
    ]
});

/// Verdict of one blocklist check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandVerdict {
    /// `false` when a pattern matched.
    pub safe: bool,
    /// Human-readable reason for the block, when unsafe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandVerdict {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn blocked(reason: &str) -> Self {
        Self {
            safe: false,
            reason: Some(format!("This command {reason}.")),
        }
    }
}

/// Match `command` against the blocklist.
///
/// A hit returns `safe == false` with the human reason; execution must
/// abort and the reason be surfaced verbatim.
#[must_use]
pub fn classify_command(command: &str) -> CommandVerdict {
    for (pattern, reason) in BLOCKLIST.iter() {
        if pattern.is_match(command) {
            tracing::warn!(
                command = %command,
                reason = %reason,
                "blocked dangerous command"
            );
            return CommandVerdict::blocked(reason);
        }
    }
    CommandVerdict::safe()
}
