use std::path::PathBuf;

use clap::Args;
use reactor_core::blueprint::{self, BuildOptions};
use reactor_core::engine::BuildContext;
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::lifecycle::{self, UpFlags};
use reactor_core::{session, state};
use tracing::instrument;

use crate::commands::shared;
use crate::ui::Spinner;

#[derive(Args, Debug)]
pub struct UpArgs {
    /// Project directory. Defaults to the current directory.
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,
    /// Override the account namespace for this invocation.
    #[arg(long)]
    pub account: Option<String>,
    /// Force a rebuild even if a matching image tag already exists.
    #[arg(long)]
    pub rebuild: bool,
    /// Start a clean, unmounted container to observe filesystem changes.
    #[arg(long)]
    pub discovery_mode: bool,
    /// Bind-mount the host's container engine socket into the container.
    #[arg(long)]
    pub docker_host_integration: bool,
    /// Extra `host:container` port mappings; overrides spec entries by host port.
    #[arg(short = 'p', long = "port")]
    pub ports: Vec<String>,
}

#[instrument(skip(args))]
pub async fn run(args: UpArgs) -> anyhow::Result<i32> {
    let workspace_folder = args
        .workspace_folder
        .unwrap_or_else(shared::default_workspace_folder);

    let mut cfg = shared::load_and_resolve(&workspace_folder)?;
    if let Some(account) = args.account {
        cfg.account = account;
    }
    let extra_ports = shared::parse_cli_ports(&args.ports)?;

    state::ensure_project_state_dirs(&cfg)?;

    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();

    let spinner = Spinner::new("recovering container");

    let opts = BuildOptions {
        discovery_mode: args.discovery_mode,
        host_engine_integration: args.docker_host_integration,
        extra_ports: &extra_ports,
        isolation: None,
    };
    let mut spec = blueprint::build_blueprint(&cfg, opts, Default::default());

    let build = cfg.spec.build.as_ref().map(|b| BuildContext {
        context_dir: cfg.project_root.join(&b.context),
        dockerfile: b.dockerfile.clone(),
        tag: format!("{}:latest", spec.name),
        no_cache: args.rebuild,
    });

    let flags = UpFlags {
        force_rebuild: args.rebuild,
        discovery_mode: args.discovery_mode,
    };

    let info = match lifecycle::up(
        &engine,
        &mut spec,
        build.as_ref(),
        flags,
        |event| {
            if let reactor_core::engine::BuildEvent::Stream(s) = event {
                print!("{s}");
            }
        },
        &cancel,
    )
    .await
    {
        Ok(info) => info,
        Err(e) => {
            spinner.finish_err(e.to_string());
            return Err(e.into());
        }
    };

    if let Some(raw) = cfg.spec.post_create_command.clone() {
        spinner.set_message("running post-create command");
        let argv = raw.into_argv();
        if let Err(e) = lifecycle::run_post_create(
            &engine,
            &info.id,
            argv,
            |chunk| {
                use std::io::Write;
                std::io::stdout().write_all(chunk).ok();
            },
            &cancel,
        )
        .await
        {
            spinner.finish_err(e.to_string());
            return Err(e.into());
        }
    }

    spinner.finish_ok(format!("{} running", spec.name));

    let shell = cfg
        .spec
        .customizations
        .as_ref()
        .and_then(|c| c.reactor.as_ref())
        .and_then(|r| r.default_command.as_ref())
        .map(|cmd| vec!["/bin/sh".to_string(), "-c".to_string(), cmd.clone()])
        .unwrap_or_else(|| vec!["/bin/sh".to_string()]);
    let code = session::attach(engine, &info.id, shell, cancel).await?;
    Ok(code as i32)
}
