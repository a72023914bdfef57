//! Kernel-level confinement for plugin child processes.
//!
//! Landlock needs an open directory descriptor per path rule, and
//! descriptors must not be opened after `fork()`. So the parent
//! pre-computes everything: it opens the descriptors and folds each
//! rule's read/write flags into a final access mask, leaving the forked
//! child nothing to do but issue syscalls (`setrlimit`, ruleset
//! assembly, `restrict_self`).

#![allow(unsafe_code)]

#[cfg(target_os = "linux")]
mod linux {
    use landlock::{
        ABI, Access, AccessFs, BitFlags, CompatLevel, Compatible, PathBeneath, PathFd, Ruleset,
        RulesetAttr, RulesetCreatedAttr,
    };
    use nix::sys::resource::{Resource, setrlimit};

    use crate::sandbox::{LandlockPathRule, ResourceLimits, SandboxProfile};

    const LANDLOCK_ABI: ABI = ABI::V2;

    /// Parent-side preparation: one opened descriptor plus its final
    /// access mask per rule. Paths that do not exist are dropped rather
    /// than failing the spawn.
    fn open_confinement(rules: &[LandlockPathRule]) -> Vec<(PathFd, BitFlags<AccessFs>)> {
        rules
            .iter()
            .filter_map(|rule| {
                let access = match (rule.read, rule.write) {
                    (true, true) => AccessFs::from_all(LANDLOCK_ABI),
                    (true, false) => AccessFs::from_read(LANDLOCK_ABI),
                    (false, true) => AccessFs::from_write(LANDLOCK_ABI),
                    (false, false) => return None,
                };
                PathFd::new(&rule.path).ok().map(|fd| (fd, access))
            })
            .collect()
    }

    /// Child-side enforcement. Resource ceilings go first: they hold
    /// even on kernels without Landlock, where the ruleset reports
    /// NotEnforced under BestEffort compatibility.
    fn engage(
        grants: Vec<(PathFd, BitFlags<AccessFs>)>,
        limits: &ResourceLimits,
    ) -> std::io::Result<()> {
        let ceilings = [
            (Resource::RLIMIT_NPROC, limits.max_processes),
            (Resource::RLIMIT_AS, limits.max_memory_bytes),
            (Resource::RLIMIT_NOFILE, limits.max_open_files),
        ];
        for (resource, limit) in ceilings {
            setrlimit(resource, limit, limit).map_err(std::io::Error::from)?;
        }

        let mut ruleset = Ruleset::default()
            .set_compatibility(CompatLevel::BestEffort)
            .handle_access(AccessFs::from_all(LANDLOCK_ABI))
            .map_err(std::io::Error::other)?
            .create()
            .map_err(std::io::Error::other)?;
        for (fd, access) in grants {
            ruleset = ruleset
                .add_rule(PathBeneath::new(fd, access))
                .map_err(std::io::Error::other)?;
        }
        ruleset.restrict_self().map_err(std::io::Error::other)?;
        Ok(())
    }

    /// Attach the confinement hook to a command before spawning.
    ///
    /// The `unsafe` is demanded by `pre_exec`: the closure runs between
    /// `fork()` and `exec()`, where only async-signal-safe work is
    /// allowed. Every descriptor was opened above in [`open_confinement`];
    /// the closure itself is syscalls over that prepared state.
    pub(crate) fn apply_sandbox_pre_exec(
        cmd: &mut tokio::process::Command,
        profile: &SandboxProfile,
    ) {
        let mut grants = open_confinement(&profile.landlock_rules());
        let limits = profile.resource_limits.clone();
        let mut engaged = false;
        // SAFETY: see above; the guard keeps a re-spawned Command from
        // engaging with descriptors that were already consumed.
        unsafe {
            cmd.pre_exec(move || {
                if std::mem::replace(&mut engaged, true) {
                    return Err(std::io::Error::other("confinement hook re-entered"));
                }
                engage(std::mem::take(&mut grants), &limits)
            });
        }
    }
}

#[cfg(target_os = "linux")]
pub(crate) use linux::apply_sandbox_pre_exec;

/// Non-Linux platforms confine through command wrapping (macOS) or not
/// at all; there is no `pre_exec` hook to install.
#[cfg(not(target_os = "linux"))]
pub(crate) fn apply_sandbox_pre_exec(
    _cmd: &mut tokio::process::Command,
    _profile: &crate::sandbox::SandboxProfile,
) {
}
