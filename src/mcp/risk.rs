//! Permission risk assessment for the approval prompt.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::mcp::manifest::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

lazy_static! {
    static ref SECRET_NAME: Regex = Regex::new(r"(?i)(_KEY|_TOKEN|_SECRET)$").unwrap();
}

/// Rule-based risk level.
///
/// High: writes outside the documents subtree, any shell grant, network
/// wildcard, or a broad environment grant that includes a secret-shaped
/// name. Medium: reads of user directories, any network, clipboard, any
/// environment variable. Low otherwise.
pub fn calculate_risk(permissions: &Permissions) -> RiskLevel {
    if permissions.shell.is_some() {
        return RiskLevel::High;
    }

    if let Some(hosts) = &permissions.network {
        if hosts.iter().any(|h| h == "*") {
            return RiskLevel::High;
        }
    }

    if let Some(fs_perms) = &permissions.filesystem {
        for perm in fs_perms {
            let writes = matches!(perm.access.as_str(), "write" | "read-write");
            if writes && !is_documents_subtree(&perm.path) {
                return RiskLevel::High;
            }
        }
    }

    if let Some(env_vars) = &permissions.environment {
        if env_vars.len() > 2 && env_vars.iter().any(|v| SECRET_NAME.is_match(v)) {
            return RiskLevel::High;
        }
    }

    let has_fs_read = permissions
        .filesystem
        .as_ref()
        .map_or(false, |perms| !perms.is_empty());
    let has_network = permissions
        .network
        .as_ref()
        .map_or(false, |hosts| !hosts.is_empty());
    let has_env = permissions
        .environment
        .as_ref()
        .map_or(false, |vars| !vars.is_empty());

    if has_fs_read || has_network || permissions.clipboard || has_env {
        return RiskLevel::Medium;
    }

    RiskLevel::Low
}

fn is_documents_subtree(path: &str) -> bool {
    let expanded = path.strip_prefix("~/").unwrap_or(path);
    expanded.starts_with("Documents")
        || expanded.contains("/Documents/")
        || expanded.ends_with("/Documents")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::manifest::FsPerm;

    #[test]
    fn empty_permissions_are_low() {
        assert_eq!(calculate_risk(&Permissions::default()), RiskLevel::Low);
    }

    #[test]
    fn clipboard_is_medium() {
        let perms = Permissions { clipboard: true, ..Default::default() };
        assert_eq!(calculate_risk(&perms), RiskLevel::Medium);
    }

    #[test]
    fn named_host_is_medium_wildcard_is_high() {
        let named = Permissions {
            network: Some(vec!["api.example.com".into()]),
            ..Default::default()
        };
        assert_eq!(calculate_risk(&named), RiskLevel::Medium);

        let wildcard = Permissions { network: Some(vec!["*".into()]), ..Default::default() };
        assert_eq!(calculate_risk(&wildcard), RiskLevel::High);
    }

    #[test]
    fn shell_is_always_high() {
        let perms = Permissions { shell: Some(vec!["echo".into()]), ..Default::default() };
        assert_eq!(calculate_risk(&perms), RiskLevel::High);
    }

    #[test]
    fn documents_write_is_medium_elsewhere_is_high() {
        let docs = Permissions {
            filesystem: Some(vec![FsPerm {
                path: "~/Documents/exports".into(),
                access: "write".into(),
            }]),
            ..Default::default()
        };
        assert_eq!(calculate_risk(&docs), RiskLevel::Medium);

        let system = Permissions {
            filesystem: Some(vec![FsPerm { path: "/etc".into(), access: "write".into() }]),
            ..Default::default()
        };
        assert_eq!(calculate_risk(&system), RiskLevel::High);
    }

    #[test]
    fn secret_shaped_env_grant_escalates() {
        let modest = Permissions {
            environment: Some(vec!["JIRA_TOKEN".into()]),
            ..Default::default()
        };
        assert_eq!(calculate_risk(&modest), RiskLevel::Medium);

        let broad = Permissions {
            environment: Some(vec!["A".into(), "B".into(), "GITHUB_TOKEN".into()]),
            ..Default::default()
        };
        assert_eq!(calculate_risk(&broad), RiskLevel::High);
    }
}
