use std::path::PathBuf;

use clap::Args;
use reactor_core::engine::BuildContext;
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::identity::container_name;
use tracing::instrument;

use crate::commands::shared;
use crate::ui::Spinner;

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
    #[arg(long)]
    pub no_cache: bool,
}

#[instrument(skip(args))]
pub async fn run(args: BuildArgs) -> anyhow::Result<i32> {
    let workspace_folder = args
        .workspace_folder
        .unwrap_or_else(shared::default_workspace_folder);

    let cfg = shared::load_and_resolve(&workspace_folder)?;

    let Some(build_spec) = cfg.spec.build.clone() else {
        anyhow::bail!("devcontainer.json has no `build` section; nothing to build");
    };

    let name = container_name(&cfg.account, &cfg.project_root, &cfg.project_hash, None);
    let build = BuildContext {
        context_dir: cfg.project_root.join(&build_spec.context),
        dockerfile: build_spec.dockerfile,
        tag: format!("{name}:latest"),
        no_cache: args.no_cache,
    };

    let engine = BollardEngine::connect()?;
    let spinner = Spinner::new(format!("building {}", build.tag));
    let cancel = shared::ctrl_c_cancellation();

    use futures::StreamExt;
    use reactor_core::engine::Engine as _;
    let mut stream = engine.image_build(&build, &cancel).await?;
    while let Some(event) = stream.next().await {
        match event? {
            reactor_core::engine::BuildEvent::Stream(s) => print!("{s}"),
            reactor_core::engine::BuildEvent::Error(msg) => {
                spinner.finish_err(msg.clone());
                anyhow::bail!("build failed: {msg}");
            }
        }
    }

    spinner.finish_ok(format!("built {}", build.tag));
    Ok(0)
}
