//! Persisted plugin approvals.
//!
//! One JSON document under the configuration root maps plugin ids to
//! approval records. A record is only honoured while its stored
//! permissions hash matches the manifest's current hash; a plugin that
//! widens its permissions re-enters the pending queue.
//!
//! The record file and the plugin directories live in separate places on
//! purpose: approvals survive plugin updates that do not touch
//! permissions.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PluginResult;
use crate::manifest::{Permissions, PluginManifest, permissions_hash};
use crate::risk::RiskLevel;

/// One persisted decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Whether the user approved the plugin.
    pub approved: bool,
    /// When the decision was made.
    pub approved_at: DateTime<Utc>,
    /// Hash of the permissions block the decision covered.
    pub permissions_hash: String,
}

/// A plugin awaiting a user decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Plugin id.
    pub plugin_id: String,
    /// Display name.
    pub name: String,
    /// Manifest description.
    pub description: String,
    /// Computed risk level.
    pub risk: RiskLevel,
    /// The permissions being requested.
    pub permissions: Permissions,
}

impl PendingApproval {
    /// Build a pending entry from a manifest.
    #[must_use]
    pub fn from_manifest(manifest: &PluginManifest, risk: RiskLevel) -> Self {
        Self {
            plugin_id: manifest.id.clone(),
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            risk,
            permissions: manifest.permissions.clone(),
        }
    }
}

/// The approval-record file plus the in-order pending queue.
#[derive(Debug)]
pub struct ApprovalStore {
    path: PathBuf,
    records: BTreeMap<String, ApprovalRecord>,
    pending: VecDeque<PendingApproval>,
}

impl ApprovalStore {
    /// Load the store from `path`, tolerating a missing file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or
    /// parsed.
    pub fn load(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records,
            pending: VecDeque::new(),
        })
    }

    /// Whether `manifest` is approved under its current permissions hash.
    #[must_use]
    pub fn is_approved(&self, manifest: &PluginManifest) -> bool {
        let hash = permissions_hash(&manifest.permissions);
        self.records
            .get(&manifest.id)
            .is_some_and(|r| r.approved && r.permissions_hash == hash)
    }

    /// Whether a decision (either way) exists for the current hash.
    ///
    /// Denied plugins with an unchanged hash are not re-prompted.
    #[must_use]
    pub fn has_current_decision(&self, manifest: &PluginManifest) -> bool {
        let hash = permissions_hash(&manifest.permissions);
        self.records
            .get(&manifest.id)
            .is_some_and(|r| r.permissions_hash == hash)
    }

    /// Queue a plugin for the consent flow, skipping duplicates.
    pub fn enqueue_pending(&mut self, pending: PendingApproval) {
        if self
            .pending
            .iter()
            .any(|p| p.plugin_id == pending.plugin_id)
        {
            return;
        }
        info!(plugin_id = %pending.plugin_id, risk = ?pending.risk, "plugin awaiting approval");
        self.pending.push_back(pending);
    }

    /// Snapshot of the pending queue, consumed front-first by the UI.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingApproval> {
        self.pending.iter().cloned().collect()
    }

    /// Record a user decision and write it through atomically.
    ///
    /// Returns the pending entry the decision answered, when one was
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns an error when the record file cannot be written.
    pub fn decide(
        &mut self,
        plugin_id: &str,
        approved: bool,
        permissions: &Permissions,
    ) -> PluginResult<Option<PendingApproval>> {
        let record = ApprovalRecord {
            approved,
            approved_at: Utc::now(),
            permissions_hash: permissions_hash(permissions),
        };
        self.records.insert(plugin_id.to_string(), record);
        self.persist()?;

        let answered = self
            .pending
            .iter()
            .position(|p| p.plugin_id == plugin_id)
            .and_then(|at| self.pending.remove(at));

        info!(plugin_id = %plugin_id, approved, "recorded approval decision");
        Ok(answered)
    }

    /// Write-to-temp-then-rename so a crash never truncates the file.
    fn persist(&self) -> PluginResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&tmp, body)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(path = %self.path.display(), error = %e, "atomic rename failed");
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginRuntime;
    use crate::risk::assess_risk;

    fn manifest(id: &str, permissions: Permissions) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: "Test".to_string(),
            version: "0.1.0".to_string(),
            description: String::new(),
            runtime: PluginRuntime::Node,
            entry: "index.js".to_string(),
            permissions,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ApprovalStore::load(tmp.path().join("approvals.json")).unwrap();
        assert!(store.pending().is_empty());
    }

    #[test]
    fn decide_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("approvals.json");
        let m = manifest("com.example.a", Permissions::default());

        let mut store = ApprovalStore::load(&path).unwrap();
        assert!(!store.is_approved(&m));
        store.decide(&m.id, true, &m.permissions).unwrap();
        assert!(store.is_approved(&m));

        let reloaded = ApprovalStore::load(&path).unwrap();
        assert!(reloaded.is_approved(&m));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn stale_hash_is_not_approved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("approvals.json");
        let original = manifest("com.example.a", Permissions::default());

        let mut store = ApprovalStore::load(&path).unwrap();
        store
            .decide(&original.id, true, &original.permissions)
            .unwrap();

        let widened = manifest(
            "com.example.a",
            Permissions {
                shell: Some(vec!["git".to_string()]),
                ..Permissions::default()
            },
        );

        assert!(!store.is_approved(&widened));
        assert!(!store.has_current_decision(&widened));
    }

    #[test]
    fn denied_plugins_keep_their_decision() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("approvals.json");
        let m = manifest("com.example.a", Permissions::default());

        let mut store = ApprovalStore::load(&path).unwrap();
        store.decide(&m.id, false, &m.permissions).unwrap();
        assert!(!store.is_approved(&m));
        assert!(store.has_current_decision(&m));
    }

    #[test]
    fn pending_queue_dedupes_and_answers() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manifest("com.example.a", Permissions::default());
        let mut store = ApprovalStore::load(tmp.path().join("approvals.json")).unwrap();

        let pending = PendingApproval::from_manifest(&m, assess_risk(&m.permissions));
        store.enqueue_pending(pending.clone());
        store.enqueue_pending(pending);
        assert_eq!(store.pending().len(), 1);

        let answered = store.decide(&m.id, true, &m.permissions).unwrap();
        assert!(answered.is_some());
        assert!(store.pending().is_empty());
    }
}
