use std::path::PathBuf;

use clap::Args;
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::identity::container_name;
use reactor_core::lifecycle;
use tracing::instrument;

use crate::commands::shared;

#[derive(Args, Debug)]
pub struct DownArgs {
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
    #[arg(long)]
    pub account: Option<String>,
}

#[instrument(skip(args))]
pub async fn run(args: DownArgs) -> anyhow::Result<i32> {
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
    lifecycle::down(&engine, &name, &cancel).await?;
    println!("{name} removed");
    Ok(0)
}
