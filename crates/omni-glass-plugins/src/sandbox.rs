//! OS-level sandbox profiles for plugin processes.
//!
//! Derived from a plugin's approved permission grants and applied at
//! spawn time:
//!
//! - **Linux**: Landlock path rules (kernel 5.13+) plus `setrlimit`
//!   resource limits, applied in a `pre_exec` hook
//! - **macOS**: `sandbox-exec` with a generated Scheme DSL profile
//!   (deprecated but functional)
//! - **Other**: no-op with a warning
//!
//! The profile grants read access to the plugin's own directory and the
//! system library paths, write access only to the paths its manifest was
//! approved for, and network egress limited to the granted hosts
//! (best-effort on platforms that can express it).

use std::path::{Path, PathBuf};

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
use tracing::warn;

use crate::error::PluginResult;
use crate::manifest::{FsAccess, PluginManifest};

/// Resource limits applied to plugin subprocesses on Linux.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of processes/threads (`RLIMIT_NPROC`, per-UID).
    pub max_processes: u64,
    /// Maximum virtual address space in bytes (`RLIMIT_AS`). Node/V8
    /// reserves gigabytes of address space up front, so this stays high.
    pub max_memory_bytes: u64,
    /// Maximum open file descriptors (`RLIMIT_NOFILE`).
    pub max_open_files: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_processes: 256,
            max_memory_bytes: 4 * 1024 * 1024 * 1024,
            max_open_files: 256,
        }
    }
}

/// Sandbox profile for one plugin process.
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    /// Plugin directory, readable so the plugin can load its own files.
    pub plugin_dir: PathBuf,
    /// Paths the plugin may read (from `filesystem` grants).
    pub read_paths: Vec<PathBuf>,
    /// Paths the plugin may read and write (from `filesystem` grants).
    pub write_paths: Vec<PathBuf>,
    /// Allowed network destinations. Empty means no restriction is
    /// expressed (stdio-only plugins typically grant nothing).
    pub allowed_network: Vec<String>,
    /// Resource limits for the subprocess.
    pub resource_limits: ResourceLimits,
}

impl SandboxProfile {
    /// Build a profile from an approved manifest.
    #[must_use]
    pub fn for_manifest(manifest: &PluginManifest, plugin_dir: &Path) -> Self {
        let home = std::env::var("HOME").unwrap_or_default();
        let expand = |p: &str| -> PathBuf {
            p.strip_prefix("~/")
                .map_or_else(|| PathBuf::from(p), |rest| Path::new(&home).join(rest))
        };

        let mut read_paths = Vec::new();
        let mut write_paths = Vec::new();
        for grant in &manifest.permissions.filesystem {
            match grant.access {
                FsAccess::Read => read_paths.push(expand(&grant.path)),
                FsAccess::Write => write_paths.push(expand(&grant.path)),
            }
        }

        Self {
            plugin_dir: plugin_dir.to_path_buf(),
            read_paths,
            write_paths,
            allowed_network: manifest
                .permissions
                .network
                .clone()
                .unwrap_or_default(),
            resource_limits: ResourceLimits::default(),
        }
    }

    /// Wrap a command with platform-specific sandbox enforcement.
    ///
    /// On macOS this prepends `sandbox-exec -f <profile>`. On Linux the
    /// command is returned unchanged; Landlock rules are applied through
    /// a `pre_exec` hook when the supervisor builds the command. On
    /// unsupported platforms the command is returned unchanged with a
    /// warning.
    pub fn wrap_command(
        &self,
        command: &str,
        args: &[String],
    ) -> PluginResult<(String, Vec<String>)> {
        self.platform_wrap_command(command, args)
    }

    #[cfg(target_os = "macos")]
    fn platform_wrap_command(
        &self,
        command: &str,
        args: &[String],
    ) -> PluginResult<(String, Vec<String>)> {
        use crate::error::PluginError;

        let profile_content = self.generate_macos_profile(command);
        let profile_path =
            std::env::temp_dir().join(format!("omni-glass-sandbox-{}.sb", std::process::id()));
        std::fs::write(&profile_path, &profile_content)
            .map_err(|e| PluginError::Sandbox(format!("failed to write sandbox profile: {e}")))?;

        let mut sandbox_args = vec![
            "-f".to_string(),
            profile_path.to_string_lossy().to_string(),
            command.to_string(),
        ];
        sandbox_args.extend(args.iter().cloned());

        Ok(("sandbox-exec".to_string(), sandbox_args))
    }

    #[cfg(target_os = "linux")]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn platform_wrap_command(
        &self,
        command: &str,
        args: &[String],
    ) -> PluginResult<(String, Vec<String>)> {
        // Landlock is applied via a pre_exec hook, not command wrapping.
        Ok((command.to_string(), args.to_vec()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn platform_wrap_command(
        &self,
        command: &str,
        args: &[String],
    ) -> PluginResult<(String, Vec<String>)> {
        warn!("OS-level sandboxing is unavailable on this platform; plugin runs unconfined");
        Ok((command.to_string(), args.to_vec()))
    }

    /// Generate a macOS `sandbox-exec` Scheme DSL profile.
    #[cfg(target_os = "macos")]
    fn generate_macos_profile(&self, command: &str) -> String {
        use std::fmt::Write;

        let mut profile = String::new();
        profile.push_str("(version 1)\n");
        profile.push_str("(deny default)\n\n");

        let _ = writeln!(
            profile,
            "(allow file-read* (subpath \"{}\"))",
            self.plugin_dir.display()
        );

        for sys_path in &[
            "/usr/lib",
            "/usr/local/lib",
            "/usr/local/bin",
            "/usr/bin",
            "/opt/homebrew",
            "/private/var/folders",
        ] {
            let _ = writeln!(profile, "(allow file-read* (subpath \"{sys_path}\"))");
        }

        for path in &self.read_paths {
            let _ = writeln!(
                profile,
                "(allow file-read* (subpath \"{}\"))",
                path.display()
            );
        }
        for path in &self.write_paths {
            let _ = writeln!(
                profile,
                "(allow file-read* (subpath \"{}\"))",
                path.display()
            );
            let _ = writeln!(
                profile,
                "(allow file-write* (subpath \"{}\"))",
                path.display()
            );
        }

        let _ = writeln!(profile, "(allow process-exec (literal \"{command}\"))");
        profile.push_str("(allow process-fork)\n");
        profile.push_str("(allow sysctl-read)\n");
        profile.push_str("(allow mach-lookup)\n");

        if self.allowed_network.is_empty() {
            profile.push_str("(deny network-outbound)\n");
            profile.push_str("(deny network-inbound)\n");
        } else {
            profile.push_str("(allow network-outbound (local ip \"localhost:*\"))\n");
            for host in &self.allowed_network {
                let _ = writeln!(profile, "(allow network-outbound (remote ip \"{host}:*\"))");
            }
        }

        profile
    }

    /// Landlock `(path, read, write)` rule specifications for Linux.
    ///
    /// System trees are readable (the interpreter, its loader, and
    /// shared libraries live there); the user's data is not. The temp
    /// directory is the only writable path beyond explicit grants.
    #[must_use]
    pub fn landlock_rules(&self) -> Vec<LandlockPathRule> {
        let mut rules = vec![
            LandlockPathRule {
                path: self.plugin_dir.clone(),
                read: true,
                write: false,
            },
            LandlockPathRule {
                path: std::env::temp_dir(),
                read: true,
                write: true,
            },
        ];

        for sys_path in &[
            Path::new("/usr"),
            Path::new("/lib"),
            Path::new("/lib64"),
            Path::new("/bin"),
            Path::new("/sbin"),
            Path::new("/etc"),
            Path::new("/opt"),
            Path::new("/proc"),
            Path::new("/dev"),
        ] {
            if sys_path.exists() {
                rules.push(LandlockPathRule {
                    path: sys_path.to_path_buf(),
                    read: true,
                    write: false,
                });
            }
        }

        for path in &self.read_paths {
            rules.push(LandlockPathRule {
                path: path.clone(),
                read: true,
                write: false,
            });
        }
        for path in &self.write_paths {
            rules.push(LandlockPathRule {
                path: path.clone(),
                read: true,
                write: true,
            });
        }

        rules
    }
}

/// A Landlock path rule specification.
#[derive(Debug, Clone)]
pub struct LandlockPathRule {
    /// Filesystem path.
    pub path: PathBuf,
    /// Allow read access.
    pub read: bool,
    /// Allow write access.
    pub write: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FsPermission, Permissions, PluginRuntime};

    fn manifest_with(permissions: Permissions) -> PluginManifest {
        PluginManifest {
            id: "com.example.x".to_string(),
            name: "X".to_string(),
            version: "0.1.0".to_string(),
            description: String::new(),
            runtime: PluginRuntime::Node,
            entry: "index.js".to_string(),
            permissions,
        }
    }

    #[test]
    fn profile_reflects_filesystem_grants() {
        let permissions = Permissions {
            filesystem: vec![
                FsPermission {
                    path: "/tmp/exports".to_string(),
                    access: FsAccess::Write,
                },
                FsPermission {
                    path: "/etc/hosts".to_string(),
                    access: FsAccess::Read,
                },
            ],
            ..Permissions::default()
        };
        let profile =
            SandboxProfile::for_manifest(&manifest_with(permissions), Path::new("/plugins/x"));

        assert_eq!(profile.write_paths, vec![PathBuf::from("/tmp/exports")]);
        assert_eq!(profile.read_paths, vec![PathBuf::from("/etc/hosts")]);
        assert_eq!(profile.plugin_dir, PathBuf::from("/plugins/x"));
    }

    #[test]
    fn landlock_rules_cover_grants() {
        let permissions = Permissions {
            filesystem: vec![FsPermission {
                path: "/tmp/exports".to_string(),
                access: FsAccess::Write,
            }],
            ..Permissions::default()
        };
        let profile =
            SandboxProfile::for_manifest(&manifest_with(permissions), Path::new("/plugins/x"));
        let rules = profile.landlock_rules();

        let plugin_rule = rules
            .iter()
            .find(|r| r.path == PathBuf::from("/plugins/x"))
            .unwrap();
        assert!(plugin_rule.read);
        assert!(!plugin_rule.write);

        let write_rule = rules
            .iter()
            .find(|r| r.path == PathBuf::from("/tmp/exports"))
            .unwrap();
        assert!(write_rule.write);
    }

    #[test]
    fn wrap_command_returns_a_runnable_pair() {
        let profile =
            SandboxProfile::for_manifest(&manifest_with(Permissions::default()), Path::new("/p"));
        let (cmd, args) = profile
            .wrap_command("node", &["index.js".to_string()])
            .unwrap();
        assert!(!cmd.is_empty());
        assert!(args.iter().any(|a| a == "index.js"));
    }

    #[test]
    fn tilde_paths_expand_against_home() {
        let permissions = Permissions {
            filesystem: vec![FsPermission {
                path: "~/Documents/exports".to_string(),
                access: FsAccess::Write,
            }],
            ..Permissions::default()
        };
        let profile =
            SandboxProfile::for_manifest(&manifest_with(permissions), Path::new("/p"));
        assert!(!profile.write_paths[0].to_string_lossy().starts_with('~'));
    }
}
