//! C6.1: workspace manifest discovery and parsing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ReactorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceService {
    pub path: String,
    pub account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    pub version: String,
    pub services: BTreeMap<String, WorkspaceService>,
}

/// Find `reactor-workspace.yml`/`.yaml` either at `path` directly (if it is
/// a file) or inside it (if a directory).
pub fn find_manifest(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    for candidate in ["reactor-workspace.yml", "reactor-workspace.yaml"] {
        let full = path.join(candidate);
        if full.is_file() {
            return Some(full);
        }
    }
    None
}

/// Parse a manifest file and compute its stable instance hash.
pub fn load_manifest(path: &Path) -> Result<(WorkspaceManifest, String)> {
    let bytes = std::fs::read(path).map_err(ReactorError::Io)?;

    let manifest: WorkspaceManifest =
        serde_yaml::from_slice(&bytes).map_err(|e| ReactorError::SpecParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let digest = Sha256::digest(&bytes);
    let hash = digest[..4].iter().map(|b| format!("{b:02x}")).collect();

    Ok((manifest, hash))
}

/// Resolve `service.path` against the manifest's containing directory,
/// rejecting any path that escapes it via `..` traversal.
pub fn resolve_service_path(manifest_dir: &Path, service: &WorkspaceService) -> Result<PathBuf> {
    let candidate = manifest_dir.join(&service.path);
    let canonical = candidate
        .canonicalize()
        .map_err(ReactorError::Io)?;
    let manifest_canonical = manifest_dir
        .canonicalize()
        .map_err(ReactorError::Io)?;

    if !canonical.starts_with(&manifest_canonical) {
        return Err(ReactorError::InvalidSpec(format!(
            "service path {:?} escapes workspace directory",
            service.path
        )));
    }

    Ok(canonical)
}
