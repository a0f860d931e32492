use std::path::PathBuf;

use clap::Args;
use reactor_core::config;
use tracing::instrument;

use crate::commands::shared;

#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
}

#[instrument(skip(args))]
pub async fn run(args: InitArgs) -> anyhow::Result<i32> {
    let workspace_folder = args
        .workspace_folder
        .unwrap_or_else(shared::default_workspace_folder);

    let path = config::initialize_project(&workspace_folder)?;
    println!("wrote {}", path.display());
    Ok(0)
}
