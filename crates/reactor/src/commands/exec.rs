use std::path::PathBuf;

use clap::Args;
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::identity::container_name;
use reactor_core::session;
use tracing::instrument;

use crate::commands::shared;

#[derive(Args, Debug)]
pub struct ExecArgs {
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
    #[arg(long)]
    pub account: Option<String>,
    /// Command to run inside the project container.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[instrument(skip(args))]
pub async fn run(args: ExecArgs) -> anyhow::Result<i32> {
    let workspace_folder = args
        .workspace_folder
        .unwrap_or_else(shared::default_workspace_folder);

    let mut cfg = shared::load_and_resolve(&workspace_folder)?;
    if let Some(account) = args.account {
        cfg.account = account;
    }

    let name = container_name(&cfg.account, &cfg.project_root, &cfg.project_hash, None);
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();
    let code = session::attach(engine, &name, args.command, cancel).await?;
    Ok(code as i32)
}
