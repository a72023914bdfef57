//! Result dispatch: text, file, clipboard, and confirm-gated commands.
//!
//! The dispatcher interprets an [`ActionResult`] for the UI and owns the
//! only code path that ever spawns a shell. The command string shown in
//! the confirmation dialog is byte-identical to the string handed to the
//! spawn; no quoting, substitution, or aliasing happens in between.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use omni_glass_core::{ActionResult, ResultBody};
use omni_glass_safety::classify_command;

use crate::error::{PipelineError, PipelineResult};

/// What the UI should do with a dispatched result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Render markdown inline, with a copy button; `code_block` feeds
    /// the dedicated "copy the fix" button when present.
    Rendered {
        /// The markdown body.
        markdown: String,
        /// Content of the first fenced code block, if any.
        code_block: Option<String>,
    },
    /// A file was written; surface the resulting path.
    FileSaved {
        /// Where the file landed.
        path: PathBuf,
    },
    /// Copy silently and show a short confirmation.
    Clipboard {
        /// The clipboard payload.
        text: String,
    },
    /// Open the modal confirmation window: the literal command in a
    /// fixed-font box, the rationale above it, Cancel and Run buttons.
    AwaitingConfirmation {
        /// The literal command string.
        command: String,
        /// The model's human rationale.
        rationale: String,
    },
    /// The blocklist refused the command; no Run button exists.
    Refused {
        /// The specific human-readable reason.
        reason: String,
    },
}

/// Captured output of a confirmed command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr, kept separate for the error-copy offer.
    pub stderr: String,
    /// Exit code; `-1` when the process died without one.
    pub exit_code: i32,
}

/// Routes action results to their handlers.
#[derive(Debug, Clone)]
pub struct ResultDispatcher {
    /// Default directory for `file` results (the desktop).
    file_target: PathBuf,
}

impl ResultDispatcher {
    /// Create a dispatcher writing files under `file_target` by default.
    #[must_use]
    pub fn new(file_target: impl Into<PathBuf>) -> Self {
        Self {
            file_target: file_target.into(),
        }
    }

    /// Interpret a result for the UI.
    pub fn dispatch(&self, result: &ActionResult) -> PipelineResult<DispatchOutcome> {
        match &result.result_body {
            ResultBody::Text { text } => Ok(DispatchOutcome::Rendered {
                markdown: text.clone(),
                code_block: first_code_block(text),
            }),
            ResultBody::File {
                filename,
                content,
                mime,
            } => {
                let path = self.write_to_default(filename, content)?;
                info!(path = %path.display(), mime = %mime, "file result written");
                Ok(DispatchOutcome::FileSaved { path })
            },
            ResultBody::Clipboard { text } => Ok(DispatchOutcome::Clipboard { text: text.clone() }),
            ResultBody::Command { command, rationale } => {
                // Already checked once on receipt; check again at the
                // display boundary so nothing blocked ever gets a Run
                // button.
                let verdict = classify_command(command);
                if verdict.safe {
                    Ok(DispatchOutcome::AwaitingConfirmation {
                        command: command.clone(),
                        rationale: rationale.clone(),
                    })
                } else {
                    Ok(DispatchOutcome::Refused {
                        reason: verdict.reason.unwrap_or_default(),
                    })
                }
            },
        }
    }

    /// Write a `file` result under the default target directory,
    /// refusing filenames that try to traverse out of it.
    pub fn write_to_default(&self, filename: &str, content: &str) -> PipelineResult<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PipelineError::Io(std::io::Error::other("empty filename")))?;
        std::fs::create_dir_all(&self.file_target)?;
        let path = self.file_target.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a `file` result to an explicit path chosen in a save
    /// dialog.
    pub fn write_file_to_path(&self, path: &Path, content: &str) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Run a user-confirmed command.
    ///
    /// The blocklist runs a second time immediately before the spawn
    /// (defense in depth); the shell child is never attached to an
    /// interactive terminal, and stdout/stderr are captured separately
    /// with the exit code preserved.
    pub async fn run_confirmed_command(&self, command: &str) -> PipelineResult<CommandOutput> {
        let verdict = classify_command(command);
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_default();
            warn!(command = %command, reason = %reason, "refusing confirmed command at spawn");
            return Err(PipelineError::CommandBlocked { reason });
        }

        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let output = Command::new(shell)
            .arg(flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        info!(command = %command, exit_code = result.exit_code, "confirmed command finished");
        Ok(result)
    }
}

/// Content of the first fenced code block, for the "copy the fix"
/// button. The language token on the opening fence is skipped.
#[must_use]
pub fn first_code_block(markdown: &str) -> Option<String> {
    let open = markdown.find("```")?;
    let after_fence = &markdown[open.saturating_add(3)..];
    let body_start = after_fence.find('\n')?.saturating_add(1);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_glass_core::{ActionStatus, ResultMeta};

    fn dispatcher(dir: &Path) -> ResultDispatcher {
        ResultDispatcher::new(dir)
    }

    fn result_with(body: ResultBody) -> ActionResult {
        ActionResult {
            status: ActionStatus::Success,
            action_id: "x".to_string(),
            result_body: body,
            meta: ResultMeta::default(),
        }
    }

    #[test]
    fn text_results_expose_the_first_code_block() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = dispatcher(tmp.path())
            .dispatch(&result_with(ResultBody::Text {
                text: "Install the module:\n```bash\npip install pandas\n```\nThen rerun."
                    .to_string(),
            }))
            .unwrap();
        match outcome {
            DispatchOutcome::Rendered { code_block, .. } => {
                assert_eq!(code_block.as_deref(), Some("pip install pandas"));
            },
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[test]
    fn file_results_land_in_the_target_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = dispatcher(tmp.path())
            .dispatch(&result_with(ResultBody::File {
                filename: "export.csv".to_string(),
                content: "a,b\n1,2\n".to_string(),
                mime: "text/csv".to_string(),
            }))
            .unwrap();
        let DispatchOutcome::FileSaved { path } = outcome else {
            panic!("expected FileSaved");
        };
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
        assert!(path.starts_with(tmp.path()));
    }

    #[test]
    fn traversal_filenames_are_flattened() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = dispatcher(tmp.path())
            .dispatch(&result_with(ResultBody::File {
                filename: "../../escape.txt".to_string(),
                content: "x".to_string(),
                mime: "text/plain".to_string(),
            }))
            .unwrap();
        let DispatchOutcome::FileSaved { path } = outcome else {
            panic!("expected FileSaved");
        };
        assert!(path.starts_with(tmp.path()));
        assert!(path.ends_with("escape.txt"));
    }

    #[test]
    fn safe_commands_await_confirmation() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = dispatcher(tmp.path())
            .dispatch(&result_with(ResultBody::Command {
                command: "pip install pandas".to_string(),
                rationale: "Installs the missing module".to_string(),
            }))
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::AwaitingConfirmation {
                command: "pip install pandas".to_string(),
                rationale: "Installs the missing module".to_string(),
            }
        );
    }

    #[test]
    fn blocked_commands_get_no_run_button() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = dispatcher(tmp.path())
            .dispatch(&result_with(ResultBody::Command {
                command: "rm -rf /".to_string(),
                rationale: "cleanup".to_string(),
            }))
            .unwrap();
        let DispatchOutcome::Refused { reason } = outcome else {
            panic!("expected Refused");
        };
        assert!(reason.contains("deletes"));
    }

    #[tokio::test]
    async fn confirmed_commands_capture_output_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let output = dispatcher(tmp.path())
            .run_confirmed_command("echo hello; echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn confirmed_blocked_command_never_spawns() {
        let tmp = tempfile::tempdir().unwrap();
        let err = dispatcher(tmp.path())
            .run_confirmed_command("rm -rf /")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CommandBlocked { .. }));
    }

    #[test]
    fn no_code_block_means_no_copy_fix_button() {
        assert_eq!(first_code_block("plain text"), None);
        assert_eq!(first_code_block("unterminated ```bash\nx"), None);
    }
}
