//! Small helpers shared across command implementations.

use std::path::{Path, PathBuf};

use reactor_core::config::{self, PortMapping, ResolvedConfig};
use tokio_util::sync::CancellationToken;

/// A token that fires when the user hits Ctrl-C, for cooperative cancellation
/// of in-flight engine calls. The listener task is detached; it exits on its
/// own once the token is cancelled.
pub fn ctrl_c_cancellation() -> CancellationToken {
    let cancel = CancellationToken::new();
    let waiter = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            waiter.cancel();
        }
    });
    cancel
}

pub fn load_and_resolve(workspace_folder: &Path) -> anyhow::Result<ResolvedConfig> {
    let spec_path = config::find_spec(workspace_folder)
        .ok_or_else(|| reactor_core::ReactorError::SpecNotFound(workspace_folder.to_path_buf()))?;
    let spec = config::load_spec(&spec_path)?;
    Ok(config::resolve(spec, workspace_folder)?)
}

pub fn parse_cli_ports(raw: &[String]) -> anyhow::Result<Vec<PortMapping>> {
    raw.iter()
        .map(|s| config::parse_cli_port(s).map_err(Into::into))
        .collect()
}

pub fn default_workspace_folder() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
