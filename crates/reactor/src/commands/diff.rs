use std::path::PathBuf;

use clap::Args;
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::lifecycle;
use tracing::instrument;

use crate::commands::shared;

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
    /// Container name to diff; defaults to the current project's discovery container.
    pub name: Option<String>,
}

#[instrument(skip(args))]
pub async fn run(args: DiffArgs) -> anyhow::Result<i32> {
    let workspace_folder = args
        .workspace_folder
        .unwrap_or_else(shared::default_workspace_folder);

    let cfg = shared::load_and_resolve(&workspace_folder)?;
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();

    let changes = lifecycle::diff(&engine, args.name.as_deref(), &cfg, &cancel).await?;
    for change in changes {
        let marker = match change.kind {
            reactor_core::engine::ChangeKind::Added => "A",
            reactor_core::engine::ChangeKind::Changed => "C",
            reactor_core::engine::ChangeKind::Deleted => "D",
        };
        println!("{marker} {}", change.path);
    }
    Ok(0)
}
