//! User and host identity used to name runs.

use std::path::Path;

/// Resolves the identity of the submitting user and machine.
///
/// Injected into the [`crate::Submitter`] so tests can substitute fixed values.
pub trait IdentityResolver: Send + Sync {
    fn user_name(&self) -> String;

    fn host_name(&self) -> String;
}

/// Reads identity from the process environment and the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl IdentityResolver for SystemIdentity {
    fn user_name(&self) -> String {
        ["USER", "USERNAME", "LOGNAME"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn host_name(&self) -> String {
        if let Some(host) = std::env::var("HOSTNAME").ok().filter(|h| !h.trim().is_empty()) {
            return host;
        }
        if let Some(host) = std::env::var("COMPUTERNAME").ok().filter(|h| !h.trim().is_empty()) {
            return host;
        }
        read_hostname_file(Path::new("/etc/hostname")).unwrap_or_else(|| "localhost".to_string())
    }
}

fn read_hostname_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let host = content.trim();
    (!host.is_empty()).then(|| host.to_string())
}

/// Fixed identity, for tests and reproducible submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    pub user_name: String,
    pub host_name: String,
}

impl StaticIdentity {
    pub fn new(user_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self { user_name: user_name.into(), host_name: host_name.into() }
    }
}

impl IdentityResolver for StaticIdentity {
    fn user_name(&self) -> String {
        self.user_name.clone()
    }

    fn host_name(&self) -> String {
        self.host_name.clone()
    }
}
