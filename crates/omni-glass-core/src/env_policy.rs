//! Environment variable policy for plugin child processes.
//!
//! A plugin process inherits a fixed whitelist (`PATH`, `HOME`, `TMPDIR`
//! and OS equivalents) plus exactly the variable names its manifest
//! declares and the user approved. Everything else, notably the provider
//! API keys held by the parent, is stripped.
//!
//! On top of the whitelist, a blocklist refuses names that can inject
//! code or redirect trust anchors in the child even when a manifest asks
//! for them.

use std::collections::BTreeMap;

/// Variables every plugin inherits regardless of its manifest.
const SPAWN_ENV_WHITELIST: &[&str] = &[
    "PATH",
    "HOME",
    "TMPDIR",
    // Windows equivalents
    "TEMP",
    "TMP",
    "SYSTEMROOT",
    "USERPROFILE",
];

/// Names a manifest may never be granted.
const BLOCKED_MANIFEST_ENV: &[&str] = &[
    // Library injection (Linux)
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    // Library injection (macOS)
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    // Node.js execution control
    "NODE_OPTIONS",
    "NODE_PATH",
    // Python code injection
    "PYTHONPATH",
    "PYTHONSTARTUP",
    // Shell startup injection
    "BASH_ENV",
    "ENV",
    // TLS/CA trust injection
    "NODE_EXTRA_CA_CERTS",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
];

/// Prefixes blocked entirely (case-insensitive).
const BLOCKED_PREFIXES: &[&str] = &["ld_", "dyld_", "npm_config_"];

/// Returns `true` if a manifest-declared variable name must be refused.
#[must_use]
pub fn is_blocked_manifest_env(key: &str) -> bool {
    if BLOCKED_MANIFEST_ENV
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
    {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    BLOCKED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Build the complete environment for a plugin child process from the
/// parent's current environment.
///
/// Names outside the whitelist and the (filtered) manifest grant are
/// simply absent. The child must be spawned with `env_clear()` and then
/// this map.
#[must_use]
pub fn filtered_spawn_env(manifest_vars: &[String]) -> BTreeMap<String, String> {
    filter_env(std::env::vars(), manifest_vars)
}

/// Whitelist-filter an explicit parent environment.
///
/// Split out from [`filtered_spawn_env`] so the policy is testable
/// without mutating process state.
#[must_use]
pub fn filter_env(
    parent: impl IntoIterator<Item = (String, String)>,
    manifest_vars: &[String],
) -> BTreeMap<String, String> {
    let granted: Vec<&String> = manifest_vars
        .iter()
        .filter(|key| {
            if is_blocked_manifest_env(key) {
                tracing::warn!(
                    key = %key,
                    "refusing blocked env var from plugin manifest"
                );
                return false;
            }
            true
        })
        .collect();

    parent
        .into_iter()
        .filter(|(key, _)| {
            SPAWN_ENV_WHITELIST.iter().any(|w| w == key)
                || granted.iter().any(|g| *g == key)
        })
        .collect()
}
