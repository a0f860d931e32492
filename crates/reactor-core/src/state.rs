//! Per-account, per-project state directory layout under `<reactor_home>`.
//!
//! State directories are created lazily on first `up` and never deleted by
//! the core; creation must be idempotent since identity (I2) prevents
//! concurrent containers but not concurrent `mkdir`s.

use std::path::PathBuf;

use crate::config::ResolvedConfig;
use crate::errors::{ReactorError, Result};

/// Ensure `<reactor_home>/<account>/<project_hash>/<mount_source>/` exists
/// for every provider mount, plus an optional `project-path.txt` marker.
/// Idempotent: safe to call on every `up`.
pub fn ensure_project_state_dirs(cfg: &ResolvedConfig) -> Result<PathBuf> {
    let project_state_dir = cfg.project_state_dir()?;

    for mount in cfg.provider.mount_list() {
        let dir = project_state_dir.join(&mount.source);
        std::fs::create_dir_all(&dir).map_err(ReactorError::Io)?;
    }

    let marker = project_state_dir.join("project-path.txt");
    if !marker.is_file() {
        std::fs::write(&marker, cfg.project_root.to_string_lossy().as_bytes())
            .map_err(ReactorError::Io)?;
    }

    Ok(project_state_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectSpec;
    use crate::provider::Provider;

    fn test_config(home: &std::path::Path) -> ResolvedConfig {
        std::env::set_var("HOME", home);
        ResolvedConfig {
            spec: ProjectSpec::default(),
            project_root: PathBuf::from("/tmp/my-api"),
            project_hash: "a3b8c2d1".to_string(),
            account: "cam".to_string(),
            forward_ports: vec![],
            provider: Provider::Claude,
        }
    }

    #[test]
    fn creates_provider_mount_dirs_idempotently() {
        let home = tempfile::tempdir().unwrap();
        let cfg = test_config(home.path());

        let dir1 = ensure_project_state_dirs(&cfg).unwrap();
        let dir2 = ensure_project_state_dirs(&cfg).unwrap();
        assert_eq!(dir1, dir2);
        assert!(dir1.join("claude").is_dir());
        assert!(dir1.join("project-path.txt").is_file());
    }
}
