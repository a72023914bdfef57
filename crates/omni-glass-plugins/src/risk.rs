//! Permission risk assessment.
//!
//! The consent flow shows one of three levels computed from the
//! manifest's permission grants. The rules are deliberately coarse; the
//! level steers how loudly the UI warns, not what is enforced (the
//! sandbox and env filter enforce the grants themselves).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::manifest::{FsAccess, Permissions};

/// Variable names that look like secrets.
static SECRET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(_KEY|_TOKEN|_SECRET)$").unwrap());

/// Coarse risk level of a permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No grants beyond the implicit stdio channel.
    Low,
    /// Reads user data or talks to the network.
    Medium,
    /// Can mutate the system or exfiltrate secrets.
    High,
}

/// Assess the risk level of a permission set.
///
/// High if any of: filesystem write outside the user's documents
/// subtree, any shell permission, a network wildcard, or more than two
/// environment variables including a secret-looking name. Medium if any
/// of: filesystem read of user directories, network to any host,
/// clipboard, or any environment variable. Low otherwise.
#[must_use]
pub fn assess_risk(permissions: &Permissions) -> RiskLevel {
    let documents = documents_prefixes();

    let writes_outside_documents = permissions.filesystem.iter().any(|fs| {
        fs.access == FsAccess::Write
            && !documents.iter().any(|d| normalized(&fs.path).starts_with(d))
    });
    let secretish_env = permissions
        .environment
        .iter()
        .any(|name| SECRET_NAME.is_match(name));

    if writes_outside_documents
        || permissions.shell.is_some()
        || permissions.has_network_wildcard()
        || (permissions.environment.len() > 2 && secretish_env)
    {
        return RiskLevel::High;
    }

    if !permissions.filesystem.is_empty()
        || permissions.network.is_some()
        || permissions.clipboard
        || !permissions.environment.is_empty()
    {
        return RiskLevel::Medium;
    }

    RiskLevel::Low
}

/// Accepted spellings of the documents subtree.
fn documents_prefixes() -> Vec<String> {
    let mut prefixes = vec!["~/Documents".to_string()];
    if let Ok(home) = std::env::var("HOME") {
        prefixes.push(format!("{home}/Documents"));
    }
    prefixes
}

fn normalized(path: &str) -> String {
    path.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FsPermission;

    fn base() -> Permissions {
        Permissions::default()
    }

    #[test]
    fn empty_grants_are_low() {
        assert_eq!(assess_risk(&base()), RiskLevel::Low);
    }

    #[test]
    fn clipboard_or_network_is_medium() {
        let mut p = base();
        p.clipboard = true;
        assert_eq!(assess_risk(&p), RiskLevel::Medium);

        let mut p = base();
        p.network = Some(vec!["api.example.com".to_string()]);
        assert_eq!(assess_risk(&p), RiskLevel::Medium);

        let mut p = base();
        p.environment = vec!["EDITOR".to_string()];
        assert_eq!(assess_risk(&p), RiskLevel::Medium);
    }

    #[test]
    fn shell_is_high() {
        let mut p = base();
        p.shell = Some(vec!["git".to_string()]);
        assert_eq!(assess_risk(&p), RiskLevel::High);
    }

    #[test]
    fn network_wildcard_is_high() {
        let mut p = base();
        p.network = Some(vec!["*".to_string()]);
        assert_eq!(assess_risk(&p), RiskLevel::High);
    }

    #[test]
    fn write_outside_documents_is_high() {
        let mut p = base();
        p.filesystem = vec![FsPermission {
            path: "/etc".to_string(),
            access: FsAccess::Write,
        }];
        assert_eq!(assess_risk(&p), RiskLevel::High);
    }

    #[test]
    fn write_inside_documents_is_medium() {
        let mut p = base();
        p.filesystem = vec![FsPermission {
            path: "~/Documents/exports".to_string(),
            access: FsAccess::Write,
        }];
        assert_eq!(assess_risk(&p), RiskLevel::Medium);
    }

    #[test]
    fn many_env_vars_with_secret_name_is_high() {
        let mut p = base();
        p.environment = vec![
            "EDITOR".to_string(),
            "LANG".to_string(),
            "JIRA_TOKEN".to_string(),
        ];
        assert_eq!(assess_risk(&p), RiskLevel::High);
    }

    #[test]
    fn two_env_vars_with_secret_name_is_medium() {
        let mut p = base();
        p.environment = vec!["EDITOR".to_string(), "JIRA_TOKEN".to_string()];
        assert_eq!(assess_risk(&p), RiskLevel::Medium);
    }

    #[test]
    fn levels_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }
}
