//! Provider sum type: the agent family a container is provisioned for.
//!
//! Modeled as a closed sum type rather than an open trait so the set of
//! providers stays exhaustively matched; adding a provider is a compile-time
//! visible change everywhere providers are consumed.

use serde::{Deserialize, Serialize};

/// A single bind-mount that a provider needs under the project's
/// per-account state directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMount {
    /// Path segment under `<project_state_dir>/`.
    pub source: String,
    /// Absolute in-container target path.
    pub target: String,
}

/// An AI-agent family: a default image plus a fixed set of mount points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Claude,
    Gemini,
    Custom {
        name: String,
        default_image: String,
        mount_list: Vec<ProviderMount>,
    },
}

impl Provider {
    /// Parse a provider by its configured name, falling back to `Claude`
    /// when unset. Only `Claude` has a concrete implementation in this
    /// version; `Gemini` is reserved for a future release and returns
    /// `None` today so callers can surface a clear "not yet supported"
    /// message instead of silently behaving like `Claude`.
    pub fn by_name(name: Option<&str>) -> Option<Provider> {
        match name {
            None | Some("claude") => Some(Provider::Claude),
            Some("gemini") => None,
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Custom { name, .. } => name,
        }
    }

    pub fn default_image(&self) -> &str {
        match self {
            Provider::Claude => "ghcr.io/reactor-dev/claude:latest",
            Provider::Gemini => "ghcr.io/reactor-dev/gemini:latest",
            Provider::Custom { default_image, .. } => default_image,
        }
    }

    pub fn mount_list(&self) -> Vec<ProviderMount> {
        match self {
            Provider::Claude => vec![ProviderMount {
                source: "claude".to_string(),
                target: "/home/claude/.claude".to_string(),
            }],
            Provider::Gemini => vec![ProviderMount {
                source: "gemini".to_string(),
                target: "/home/gemini/.gemini".to_string(),
            }],
            Provider::Custom { mount_list, .. } => mount_list.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_mount_list_matches_contract() {
        let p = Provider::Claude;
        let mounts = p.mount_list();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source, "claude");
        assert_eq!(mounts[0].target, "/home/claude/.claude");
    }

    #[test]
    fn default_provider_is_claude() {
        assert_eq!(Provider::by_name(None), Some(Provider::Claude));
    }
}
