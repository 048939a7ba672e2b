//! Templated run-dir roots.
//!
//! Supported tags:
//! - `<USERNAME>`: the resolved user name
//! - `<HOST>`: the resolved host name

use crate::error::{SubmitError, SubmitResult};
use crate::identity::IdentityResolver;
use std::path::PathBuf;

pub const USERNAME_TAG: &str = "<USERNAME>";
pub const HOST_TAG: &str = "<HOST>";

/// Expand tags in `template`, without touching the filesystem.
pub fn expand_template(template: &str, user_name: &str, host_name: &str) -> String {
    template.replace(USERNAME_TAG, user_name).replace(HOST_TAG, host_name)
}

/// Expand tags and make the result absolute against the current directory.
pub fn path_from_template(
    template: &str,
    user_name: &str,
    identity: &dyn IdentityResolver,
) -> SubmitResult<PathBuf> {
    if template.trim().is_empty() {
        return Err(SubmitError::InvalidConfig("run_dir_root must not be empty".to_string()));
    }

    let host_name = if template.contains(HOST_TAG) { identity.host_name() } else { String::new() };
    let path = PathBuf::from(expand_template(template, user_name, &host_name));
    if path.is_absolute() {
        return Ok(path);
    }

    let cwd = std::env::current_dir().map_err(|e| SubmitError::io(".", e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;

    #[test]
    fn test_expand_template_tags() {
        assert_eq!(expand_template("/runs/<USERNAME>/<HOST>", "alice", "gpu-1"), "/runs/alice/gpu-1");
        assert_eq!(expand_template("/runs/plain", "alice", "gpu-1"), "/runs/plain");
    }

    #[test]
    fn test_path_from_template_is_absolute() {
        let identity = StaticIdentity::new("alice", "gpu-1");
        let path = path_from_template("results/<USERNAME>", "bob", &identity).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("results/bob"));

        let path = path_from_template("/srv/<HOST>", "bob", &identity).unwrap();
        assert_eq!(path, PathBuf::from("/srv/gpu-1"));
    }

    #[test]
    fn test_empty_template_is_rejected() {
        let identity = StaticIdentity::new("alice", "gpu-1");
        assert!(path_from_template("  ", "alice", &identity).is_err());
    }
}
