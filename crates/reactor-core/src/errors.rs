//! Error taxonomy shared by every Reactor component.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout `reactor-core`.
pub type Result<T> = std::result::Result<T, ReactorError>;

/// The complete set of error kinds a Reactor operation can produce.
///
/// Each variant carries the offending resource's name or path so that
/// messages propagated to the caller are machine-identifiable as well as
/// human-readable, per the propagation policy: errors are never swallowed
/// except along the one documented recovery path (Phase 2 restart failure).
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("no devcontainer.json found under {0}")]
    SpecNotFound(PathBuf),

    #[error("failed to parse {path}: {message}")]
    SpecParseError { path: PathBuf, message: String },

    #[error("invalid devcontainer spec: {0}")]
    InvalidSpec(String),

    #[error("a devcontainer spec already exists at {0}")]
    InitConflict(PathBuf),

    #[error("container {0} not found")]
    NotFound(String),

    #[error("container {0} is not running")]
    NotRunning(String),

    #[error("failed to start container {0}: {1}")]
    StartFailed(String, String),

    #[error("failed to create container {0}: {1}")]
    CreateFailed(String, String),

    #[error("failed to remove container {0}: {1}")]
    RemoveFailed(String, String),

    #[error("build failed for image {0}: {1}")]
    BuildFailed(String, String),

    #[error("discovery-mode cleanup failed for container {0}: {1}")]
    CleanupFailed(String, String),

    #[error("port {port} is claimed by more than one service: {}", .services.join(", "))]
    PortConflict { port: u16, services: Vec<String> },

    #[error("port range invalid: {0}")]
    PortRangeInvalid(String),

    #[error("port spec malformed: {0}")]
    PortFormatInvalid(String),

    #[error("post-create command exited with status {status} for container {container}: {tail}")]
    PostCreateFailed {
        container: String,
        status: i64,
        tail: String,
    },

    #[error("workspace instance already running: {}", .0.join(", "))]
    AlreadyRunning(Vec<String>),

    #[error("unknown service {0}")]
    UnknownService(String),

    #[error("multiple containers match service {0}")]
    MultipleMatches(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
