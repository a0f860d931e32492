//! C3: the Engine Adapter trait — the sole I/O boundary of the core.
//!
//! Every orchestrator (C5, C6) is generic over `E: Engine` rather than
//! taking a trait object; callers always know their concrete engine type at
//! compile time, so there is no need to pay for dynamic dispatch, and the
//! mocked implementation used in tests is just another concrete type.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

pub const PING_TIMEOUT: Duration = Duration::from_secs(10);
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const LONG_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// A container's lifecycle state as observed by `list`/`inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Running,
    Stopped,
    NotFound,
}

/// C3 result of `list`/`inspect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub image: String,
    pub labels: HashMap<String, String>,
}

/// A single bind mount, `source:target[:mode]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub mode: MountMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountMode {
    ReadWrite,
    ReadOnly,
}

impl Mount {
    pub fn rw(source: impl Into<String>, target: impl Into<String>) -> Self {
        Mount {
            source: source.into(),
            target: target.into(),
            mode: MountMode::ReadWrite,
        }
    }
}

/// A host:container port binding, ready to hand to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// The full declarative description of a container to create, produced by
/// C4 and consumed by C3/C5. Contains no I/O itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub work_dir: String,
    pub user: Option<String>,
    pub environment: Vec<String>,
    pub mounts: Vec<Mount>,
    pub port_bindings: Vec<PortBinding>,
    pub labels: HashMap<String, String>,
    pub network_mode: String,
}

/// Input to `image_build`.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub context_dir: std::path::PathBuf,
    pub dockerfile: String,
    pub tag: String,
    pub no_cache: bool,
}

/// A single event in a build's output stream.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Stream(String),
    Error(String),
}

/// Options controlling an `exec_create` call.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub cmd: Vec<String>,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

/// A live, bidirectional byte stream attached to a running exec session.
pub struct ExecStream {
    pub input: Box<dyn tokio::io::AsyncWrite + Unpin + Send>,
    pub output: BoxStream<'static, std::io::Result<bytes_compat::Bytes>>,
}

/// Filesystem delta vs. the image layers, from `diff`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
}

/// A thin, mockable surface over the container engine.
///
/// Implementations must be safe for concurrent calls: the workspace
/// orchestrator (C6) dispatches N services in parallel over a single
/// shared engine handle. Every method takes a cancellation token so a
/// caller can abandon an in-flight call cooperatively instead of racing
/// it against a bare timeout; implementations should race their own
/// per-call deadline (`PING_TIMEOUT`/`CALL_TIMEOUT`/`LONG_CALL_TIMEOUT`)
/// against `cancel.cancelled()` and return `ReactorError::Cancelled`
/// when the token fires first.
pub trait Engine: Send + Sync {
    async fn ping(&self, cancel: &CancellationToken) -> Result<String>;

    async fn list(
        &self,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContainerInfo>>;

    async fn inspect(&self, id: &str, cancel: &CancellationToken) -> Result<ContainerInfo>;

    async fn create(&self, spec: &ContainerSpec, cancel: &CancellationToken) -> Result<String>;

    async fn start(&self, id: &str, cancel: &CancellationToken) -> Result<()>;

    async fn stop(&self, id: &str, grace: Duration, cancel: &CancellationToken) -> Result<()>;

    async fn remove(&self, id: &str, force: bool, cancel: &CancellationToken) -> Result<()>;

    async fn exec_create(
        &self,
        id: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<String>;

    async fn exec_start_attached(
        &self,
        exec_id: &str,
        tty: bool,
        cancel: &CancellationToken,
    ) -> Result<ExecStream>;

    async fn exec_inspect(
        &self,
        exec_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(bool, Option<i64>)>;

    async fn exec_resize(
        &self,
        exec_id: &str,
        rows: u16,
        cols: u16,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn resize(
        &self,
        id: &str,
        rows: u16,
        cols: u16,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn kill(&self, id: &str, signal_name: &str, cancel: &CancellationToken) -> Result<()>;

    async fn diff(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<FileChange>>;

    async fn image_list(&self, cancel: &CancellationToken) -> Result<Vec<String>>;

    async fn image_build(
        &self,
        build: &BuildContext,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, Result<BuildEvent>>>;
}

/// Minimal `bytes`-shaped buffer so the engine boundary doesn't need the
/// full `bytes` crate just for this one stream item type.
pub mod bytes_compat {
    #[derive(Debug, Clone)]
    pub struct Bytes(pub Vec<u8>);

    impl AsRef<[u8]> for Bytes {
        fn as_ref(&self) -> &[u8] {
            &self.0
        }
    }

    impl From<Vec<u8>> for Bytes {
        fn from(v: Vec<u8>) -> Self {
            Bytes(v)
        }
    }
}
