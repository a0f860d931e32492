//! C1: deterministic project hashing, container naming, and per-account
//! state-directory derivation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::errors::{ReactorError, Result};

/// First 8 hex characters of SHA-256 over the canonicalized, UTF-8-encoded
/// absolute project path. Stable across runs for a fixed `project_root`
/// (I3); two different relative paths to the same project canonicalize to
/// the same bytes, so they hash identically.
pub fn project_hash(project_root: &Path) -> Result<String> {
    let canonical = project_root
        .canonicalize()
        .map_err(ReactorError::Io)?;
    let canonical_str = canonical
        .to_str()
        .ok_or_else(|| ReactorError::InvalidSpec(format!("non-UTF-8 path: {canonical:?}")))?;

    let digest = Sha256::digest(canonical_str.as_bytes());
    Ok(hex_encode(&digest[..4]))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Sanitize a folder name into the `[A-Za-z0-9][A-Za-z0-9_.-]*` grammar,
/// truncated to 20 characters (I6).
pub fn sanitize_folder(raw: &str) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if !sanitized
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        sanitized = format!("project-{sanitized}");
    }

    sanitized.truncate(20);
    while sanitized.ends_with('-') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        "project".to_string()
    } else {
        sanitized
    }
}

/// Single-service container name: pure function of `(account, project_root,
/// project_hash, prefix, isolation)` (I1).
pub fn container_name(
    account: &str,
    project_root: &Path,
    project_hash: &str,
    isolation: Option<&str>,
) -> String {
    let folder = project_root
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("project");
    let sanitized = sanitize_folder(folder);

    match isolation {
        Some(prefix) if !prefix.is_empty() => {
            format!("{prefix}-reactor-{account}-{sanitized}-{project_hash}")
        }
        _ => format!("reactor-{account}-{sanitized}-{project_hash}"),
    }
}

/// Workspace-variant container name: no account segment, prefixed by the
/// service name instead.
pub fn workspace_container_name(service: &str, project_hash: &str) -> String {
    format!("reactor-ws-{service}-{project_hash}")
}

/// Default Reactor home directory, honoring `REACTOR_ISOLATION_PREFIX`.
///
/// Empty or unset prefix means `~/.reactor/`; a non-empty prefix `P` yields
/// `~/.reactor-<P>/`.
pub fn reactor_home() -> Result<PathBuf> {
    let base = directories_next::BaseDirs::new()
        .ok_or_else(|| ReactorError::InvalidSpec("could not determine home directory".into()))?
        .home_dir()
        .to_path_buf();

    let dirname = match isolation_prefix() {
        Some(p) if !p.is_empty() => format!(".reactor-{p}"),
        _ => ".reactor".to_string(),
    };

    Ok(base.join(dirname))
}

fn isolation_prefix() -> Option<String> {
    std::env::var("REACTOR_ISOLATION_PREFIX").ok()
}

/// `<reactor_home>/<account>/`
pub fn account_state_dir(account: &str) -> Result<PathBuf> {
    Ok(reactor_home()?.join(account))
}

/// `<account_state_dir>/<project_hash>/`
pub fn project_state_dir(account: &str, project_hash: &str) -> Result<PathBuf> {
    Ok(account_state_dir(account)?.join(project_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn sanitize_replaces_illegal_chars_and_truncates() {
        let raw = "my@crazy/project name with lots of spaces";
        let sanitized = sanitize_folder(raw);
        assert_eq!(sanitized, "my-crazy-project-nam");
        assert_eq!(sanitized.len(), 20);
    }

    #[test]
    fn sanitize_prepends_project_when_not_alnum_leading() {
        let sanitized = sanitize_folder("___");
        assert_eq!(sanitized, "project");
    }

    #[test]
    fn container_name_is_deterministic() {
        let root = Path::new("/Users/cam/projects/my-api");
        let name = container_name("cam", root, "a3b8c2d1", None);
        assert_eq!(name, "reactor-cam-my-api-a3b8c2d1");
    }

    #[test]
    fn container_name_honors_isolation_prefix() {
        let root = Path::new("/Users/cam/projects/my-api");
        let name = container_name("cam", root, "a3b8c2d1", Some("ci"));
        assert_eq!(name, "ci-reactor-cam-my-api-a3b8c2d1");
    }

    #[test]
    fn workspace_name_has_no_account_segment() {
        let name = workspace_container_name("api", "deadbeef");
        assert_eq!(name, "reactor-ws-api-deadbeef");
    }

    #[test]
    fn project_hash_stable_across_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().canonicalize().unwrap();
        let h1 = project_hash(&abs).unwrap();
        let h2 = project_hash(&abs).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 8);
    }
}
