//! Directory scaffolding for the Omni-Glass home directory.
//!
//! All host-owned state lives under one root:
//!
//! ```text
//! ~/.omni-glass/                  (GlassHome)
//! ├── config.toml                   (provider settings)
//! ├── approvals.json                (plugin approval records)
//! └── plugins/                      (one directory per installed plugin)
//!     └── com.example.jira/
//!         ├── omni-glass.plugin.json
//!         └── index.js
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// The Omni-Glass home directory (`~/.omni-glass/` or `$OMNI_GLASS_HOME`).
#[derive(Debug, Clone)]
pub struct GlassHome {
    root: PathBuf,
}

impl GlassHome {
    /// Resolve the home directory.
    ///
    /// Checks `$OMNI_GLASS_HOME` first, then falls back to
    /// `$HOME/.omni-glass/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$OMNI_GLASS_HOME` is relative, or neither it
    /// nor `$HOME` is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("OMNI_GLASS_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "OMNI_GLASS_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither OMNI_GLASS_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".omni-glass")
        };

        Ok(Self { root })
    }

    /// Use an explicit root (tests, embedded hosts).
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the provider configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path of the approval-record file.
    #[must_use]
    pub fn approvals_file(&self) -> PathBuf {
        self.root.join("approvals.json")
    }

    /// Directory that holds one subdirectory per installed plugin.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Create the directory tree if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if a directory cannot be created.
    pub fn ensure_layout(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.plugins_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_paths() {
        let home = GlassHome::at("/tmp/omni-test");
        assert_eq!(home.config_file(), PathBuf::from("/tmp/omni-test/config.toml"));
        assert_eq!(
            home.approvals_file(),
            PathBuf::from("/tmp/omni-test/approvals.json")
        );
        assert_eq!(home.plugins_dir(), PathBuf::from("/tmp/omni-test/plugins"));
    }

    #[test]
    fn ensure_layout_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let home = GlassHome::at(tmp.path().join("glass"));
        home.ensure_layout().unwrap();
        assert!(home.plugins_dir().is_dir());
    }
}
