//! Plugin manifest types.
//!
//! A plugin manifest (`omni-glass.plugin.json`) sits alongside the entry
//! point in a plugin-owned directory and describes identity, runtime,
//! and the permission grants the plugin requests. Unknown top-level keys
//! are ignored so manifests can carry forward-compatible metadata;
//! unknown keys inside the permissions block are rejected because a
//! permission the host cannot interpret must not be silently granted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "omni-glass.plugin.json";

/// How a plugin's entry point is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginRuntime {
    /// Node.js (`node <entry>`).
    Node,
    /// Python 3 (`python3 <entry>`).
    Python,
}

impl PluginRuntime {
    /// The interpreter binary to look up on `PATH`.
    #[must_use]
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Python => "python3",
        }
    }
}

/// Filesystem access mode for one granted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsAccess {
    /// Read-only.
    Read,
    /// Write (implies read).
    Write,
}

/// One filesystem grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsPermission {
    /// Path prefix the grant covers. A leading `~` means the user's home.
    pub path: String,
    /// Access mode.
    pub access: FsAccess,
}

/// The permission grants a plugin requests.
///
/// This block is what the permissions hash is computed over; widening any
/// field invalidates existing approvals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Permissions {
    /// Clipboard read/write.
    pub clipboard: bool,
    /// Allowed network hosts. `None` means no network; an entry of `"*"`
    /// is the wildcard.
    pub network: Option<Vec<String>>,
    /// Filesystem grants.
    pub filesystem: Vec<FsPermission>,
    /// Environment variable names forwarded from the parent.
    pub environment: Vec<String>,
    /// Allowed shell command words, when the plugin may shell out at all.
    pub shell: Option<Vec<String>>,
}

impl Permissions {
    /// Whether the network grant is the wildcard.
    #[must_use]
    pub fn has_network_wildcard(&self) -> bool {
        self.network
            .as_ref()
            .is_some_and(|hosts| hosts.iter().any(|h| h == "*"))
    }
}

/// A parsed plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Reverse-domain plugin identifier (e.g. `"com.example.jira"`).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Optional description shown in the consent flow.
    #[serde(default)]
    pub description: String,
    /// Runtime used to execute the entry point.
    pub runtime: PluginRuntime,
    /// Entry-point path, relative to the plugin directory.
    pub entry: String,
    /// Requested permission grants.
    #[serde(default)]
    pub permissions: Permissions,
}

impl PluginManifest {
    /// Load and validate the manifest inside `plugin_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] when the file is missing,
    /// unparseable, or fails validation.
    pub fn load(plugin_dir: &Path) -> PluginResult<Self> {
        let path = plugin_dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| PluginError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let manifest: Self =
            serde_json::from_str(&raw).map_err(|e| PluginError::InvalidManifest {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        manifest.validate(&path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> PluginResult<()> {
        let invalid = |reason: &str| PluginError::InvalidManifest {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.id.contains(':') {
            return Err(invalid("id must not contain ':'"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.entry.trim().is_empty() {
            return Err(invalid("entry must not be empty"));
        }
        if Path::new(&self.entry).is_absolute() || self.entry.contains("..") {
            return Err(invalid("entry must be a relative path inside the plugin dir"));
        }
        Ok(())
    }

    /// Absolute path of the entry point inside `plugin_dir`.
    #[must_use]
    pub fn entry_path(&self, plugin_dir: &Path) -> PathBuf {
        plugin_dir.join(&self.entry)
    }
}

/// Stable digest over a canonical serialization of a permissions block.
///
/// `serde_json` maps are ordered, so value-level serialization is already
/// canonical; approvals bound to this hash survive plugin updates that do
/// not touch permissions and are invalidated by any widening.
#[must_use]
pub fn permissions_hash(permissions: &Permissions) -> String {
    let canonical = serde_json::to_value(permissions)
        .map(|v| v.to_string())
        .unwrap_or_default();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, json: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), json).unwrap();
    }

    fn sample_json() -> &'static str {
        r#"{
            "id": "com.example.jira",
            "name": "Jira Actions",
            "version": "1.2.0",
            "description": "Create Jira tickets from snips",
            "runtime": "node",
            "entry": "index.js",
            "permissions": {
                "clipboard": true,
                "network": ["example.atlassian.net"],
                "environment": ["JIRA_TOKEN"]
            }
        }"#
    }

    #[test]
    fn parses_a_full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), sample_json());

        let manifest = PluginManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.id, "com.example.jira");
        assert_eq!(manifest.runtime, PluginRuntime::Node);
        assert!(manifest.permissions.clipboard);
        assert_eq!(
            manifest.permissions.environment,
            vec!["JIRA_TOKEN".to_string()]
        );
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "id": "com.example.x", "name": "X", "version": "0.1.0",
                "runtime": "node", "entry": "main.js",
                "homepage": "https://example.com",
                "keywords": ["a", "b"]
            }"#,
        );
        assert!(PluginManifest::load(dir.path()).is_ok());
    }

    #[test]
    fn unknown_permission_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "id": "com.example.x", "name": "X", "version": "0.1.0",
                "runtime": "node", "entry": "main.js",
                "permissions": {"raw_sockets": true}
            }"#,
        );
        assert!(matches!(
            PluginManifest::load(dir.path()),
            Err(PluginError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn unknown_runtime_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "id": "com.example.x", "name": "X", "version": "0.1.0",
                "runtime": "deno", "entry": "main.ts"
            }"#,
        );
        assert!(PluginManifest::load(dir.path()).is_err());
    }

    #[test]
    fn escaping_entry_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "id": "com.example.x", "name": "X", "version": "0.1.0",
                "runtime": "node", "entry": "../../evil.js"
            }"#,
        );
        assert!(PluginManifest::load(dir.path()).is_err());
    }

    #[test]
    fn hash_is_stable_across_parse_cycles() {
        let permissions: Permissions = serde_json::from_str(
            r#"{"clipboard": true, "network": ["a.example"], "environment": ["X_TOKEN"]}"#,
        )
        .unwrap();
        let first = permissions_hash(&permissions);

        let reparsed: Permissions =
            serde_json::from_str(&serde_json::to_string(&permissions).unwrap()).unwrap();
        assert_eq!(first, permissions_hash(&reparsed));
    }

    #[test]
    fn hash_changes_when_permissions_widen() {
        let narrow = Permissions::default();
        let wide = Permissions {
            shell: Some(vec!["git".to_string()]),
            ..Permissions::default()
        };
        assert_ne!(permissions_hash(&narrow), permissions_hash(&wide));
    }

    #[test]
    fn network_wildcard_detection() {
        assert!(!Permissions::default().has_network_wildcard());
        let wildcard = Permissions {
            network: Some(vec!["*".to_string()]),
            ..Permissions::default()
        };
        assert!(wildcard.has_network_wildcard());
    }
}
