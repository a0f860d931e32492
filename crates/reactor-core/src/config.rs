//! C2: find, parse, and resolve a `devcontainer.json` into a `ResolvedConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ReactorError, Result};
use crate::identity::{self, project_hash};
use crate::provider::Provider;

/// A single `host:container` port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// Raw `post_create_command` form, preserved to distinguish string from
/// sequence (the two have different shell-invocation semantics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostCreateCommand {
    Single(String),
    Sequence(Vec<String>),
}

impl PostCreateCommand {
    /// Expand into the literal argv the engine should exec.
    pub fn into_argv(self) -> Vec<String> {
        match self {
            PostCreateCommand::Single(s) => vec!["/bin/sh".to_string(), "-c".to_string(), s],
            PostCreateCommand::Sequence(seq) => seq,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_context")]
    pub context: String,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_context() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactorCustomizations {
    pub account: Option<String>,
    pub default_command: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customizations {
    pub reactor: Option<ReactorCustomizations>,
}

/// Raw port entry prior to normalization: either a bare integer or an
/// `"H:C"` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPort {
    Number(i64),
    Range(String),
}

/// The parsed `devcontainer.json`, before identity/account resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub image: Option<String>,
    pub build: Option<BuildSpec>,
    #[serde(default, rename = "forwardPorts")]
    pub forward_ports: Vec<RawPort>,
    #[serde(rename = "remoteUser")]
    pub remote_user: Option<String>,
    #[serde(rename = "postCreateCommand")]
    pub post_create_command: Option<PostCreateCommand>,
    pub customizations: Option<Customizations>,
    pub name: Option<String>,
}

/// `ProjectSpec` plus derived identity, ready for blueprint construction.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub spec: ProjectSpec,
    pub project_root: PathBuf,
    pub project_hash: String,
    pub account: String,
    pub forward_ports: Vec<PortMapping>,
    pub provider: Provider,
}

impl ResolvedConfig {
    pub fn reactor_home(&self) -> Result<PathBuf> {
        identity::reactor_home()
    }

    pub fn account_state_dir(&self) -> Result<PathBuf> {
        identity::account_state_dir(&self.account)
    }

    pub fn project_state_dir(&self) -> Result<PathBuf> {
        identity::project_state_dir(&self.account, &self.project_hash)
    }
}

/// Locate `devcontainer.json`, preferring `.devcontainer/devcontainer.json`
/// over `.devcontainer.json`. Not recursive.
pub fn find_spec(dir: &Path) -> Option<PathBuf> {
    let nested = dir.join(".devcontainer").join("devcontainer.json");
    if nested.is_file() {
        return Some(nested);
    }
    let flat = dir.join(".devcontainer.json");
    if flat.is_file() {
        return Some(flat);
    }
    None
}

/// Strip JSONC comments/trailing commas and parse into a `ProjectSpec`.
pub fn load_spec(path: &Path) -> Result<ProjectSpec> {
    let raw = std::fs::read_to_string(path).map_err(ReactorError::Io)?;

    let value: serde_json::Value =
        json5::from_str(&raw).map_err(|e| ReactorError::SpecParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if let serde_json::Value::Object(ref map) = value {
        const KNOWN: &[&str] = &[
            "image",
            "build",
            "forwardPorts",
            "remoteUser",
            "postCreateCommand",
            "customizations",
            "name",
        ];
        for key in map.keys() {
            if !KNOWN.contains(&key.as_str()) {
                debug!(key = %key, path = %path.display(), "ignoring unknown devcontainer.json key");
            }
        }
    }

    serde_json::from_value(value).map_err(|e| ReactorError::SpecParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Normalize the raw `forwardPorts` entries into `PortMapping`s.
pub fn parse_ports(raw: &[RawPort]) -> Result<Vec<PortMapping>> {
    raw.iter().map(parse_one_port).collect()
}

fn parse_one_port(raw: &RawPort) -> Result<PortMapping> {
    match raw {
        RawPort::Number(n) => {
            let port = in_range(*n)?;
            Ok(PortMapping {
                host: port,
                container: port,
            })
        }
        RawPort::Range(s) => {
            let (h, c) = s
                .split_once(':')
                .ok_or_else(|| ReactorError::PortFormatInvalid(s.clone()))?;
            let host: i64 = h
                .parse()
                .map_err(|_| ReactorError::PortFormatInvalid(s.clone()))?;
            let container: i64 = c
                .parse()
                .map_err(|_| ReactorError::PortFormatInvalid(s.clone()))?;
            Ok(PortMapping {
                host: in_range(host)?,
                container: in_range(container)?,
            })
        }
    }
}

/// Parse a CLI-supplied `-p H:C` or bare `N` port argument into a mapping.
pub fn parse_cli_port(raw: &str) -> Result<PortMapping> {
    match raw.parse::<i64>() {
        Ok(n) => parse_one_port(&RawPort::Number(n)),
        Err(_) => parse_one_port(&RawPort::Range(raw.to_string())),
    }
}

fn in_range(n: i64) -> Result<u16> {
    if (1..=65535).contains(&n) {
        Ok(n as u16)
    } else {
        Err(ReactorError::PortRangeInvalid(n.to_string()))
    }
}

/// Resolve a loaded `ProjectSpec` into a `ResolvedConfig`, applying account
/// and image defaulting.
pub fn resolve(spec: ProjectSpec, project_root: &Path) -> Result<ResolvedConfig> {
    let project_root = project_root
        .canonicalize()
        .map_err(ReactorError::Io)?;
    let hash = project_hash(&project_root)?;

    let account = spec
        .customizations
        .as_ref()
        .and_then(|c| c.reactor.as_ref())
        .and_then(|r| r.account.clone())
        .unwrap_or_else(host_username);

    let forward_ports = parse_ports(&spec.forward_ports)?;

    let provider = Provider::by_name(None)
        .ok_or_else(|| ReactorError::InvalidSpec("no default provider available".into()))?;

    Ok(ResolvedConfig {
        spec,
        project_root,
        project_hash: hash,
        account,
        forward_ports,
        provider,
    })
}

fn host_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

/// Create a starter `devcontainer.json` under `dir/.devcontainer/`.
/// Fails with `InitConflict` if a spec is already discoverable.
pub fn initialize_project(dir: &Path) -> Result<PathBuf> {
    if let Some(existing) = find_spec(dir) {
        return Err(ReactorError::InitConflict(existing));
    }

    let name = dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("project");
    let account = host_username();
    let provider = Provider::Claude;

    let devcontainer_dir = dir.join(".devcontainer");
    std::fs::create_dir_all(&devcontainer_dir).map_err(ReactorError::Io)?;
    let path = devcontainer_dir.join("devcontainer.json");

    let contents = format!(
        "// Reactor devcontainer\n{{\n  \"name\": \"{name}\",\n  \"image\": \"{image}\",\n  \"customizations\": {{\n    \"reactor\": {{\n      \"account\": \"{account}\"\n    }}\n  }}\n}}\n",
        name = name,
        image = provider.default_image(),
        account = account,
    );

    std::fs::write(&path, contents).map_err(ReactorError::Io)?;
    Ok(path)
}

/// Merge `extra` ports into `base`; an entry in `extra` overrides any
/// `base` entry sharing the same host port.
pub fn merge_ports(base: &[PortMapping], extra: &[PortMapping]) -> Vec<PortMapping> {
    let mut merged: HashMap<u16, PortMapping> =
        base.iter().map(|p| (p.host, *p)).collect();
    for p in extra {
        merged.insert(p.host, *p);
    }
    let mut out: Vec<PortMapping> = merged.into_values().collect();
    out.sort_by_key(|p| p.host);
    out
}
