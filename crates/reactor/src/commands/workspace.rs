use std::path::PathBuf;

use clap::{Args, Subcommand};
use reactor_core::engine_bollard::BollardEngine;
use reactor_core::workspace::{self, WorkspaceManifest};
use reactor_core::workspace_orchestrator;
use tracing::instrument;

use crate::commands::shared;

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Resolve every service's spec; fails iff any service fails.
    Validate(ManifestArgs),
    /// Show expected container name and engine state per service.
    List(ManifestArgs),
    /// Start the selected (or all) services in parallel.
    Up(WorkspaceUpArgs),
    /// Stop and remove the selected (or all) services.
    Down(WorkspaceServicesArgs),
    /// Attach an interactive session to one running service.
    Exec(WorkspaceExecArgs),
}

#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Manifest file or directory containing `reactor-workspace.yml`.
    #[arg(long, default_value = ".")]
    pub manifest: PathBuf,
}

#[derive(Args, Debug)]
pub struct WorkspaceUpArgs {
    #[arg(long, default_value = ".")]
    pub manifest: PathBuf,
    #[arg(short = 'p', long = "port")]
    pub ports: Vec<String>,
    /// Services to start; defaults to all.
    pub services: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WorkspaceServicesArgs {
    #[arg(long, default_value = ".")]
    pub manifest: PathBuf,
    pub services: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WorkspaceExecArgs {
    #[arg(long, default_value = ".")]
    pub manifest: PathBuf,
    pub service: String,
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

fn load_manifest(path: &PathBuf) -> anyhow::Result<(PathBuf, WorkspaceManifest, String)> {
    let manifest_path = workspace::find_manifest(path)
        .ok_or_else(|| anyhow::anyhow!("no reactor-workspace.yml found at {}", path.display()))?;
    let manifest_dir = manifest_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let (manifest, hash) = workspace::load_manifest(&manifest_path)?;
    Ok((manifest_dir, manifest, hash))
}

pub async fn run(cmd: WorkspaceCommand) -> anyhow::Result<i32> {
    match cmd {
        WorkspaceCommand::Validate(args) => run_validate(args).await,
        WorkspaceCommand::List(args) => run_list(args).await,
        WorkspaceCommand::Up(args) => run_up(args).await,
        WorkspaceCommand::Down(args) => run_down(args).await,
        WorkspaceCommand::Exec(args) => run_exec(args).await,
    }
}

#[instrument(skip(args))]
async fn run_validate(args: ManifestArgs) -> anyhow::Result<i32> {
    let (manifest_dir, manifest, _hash) = load_manifest(&args.manifest)?;
    let results = workspace_orchestrator::validate(&manifest_dir, &manifest);

    let mut failed = 0;
    for (service, result) in results {
        match result {
            Ok(()) => println!("{service}: ok"),
            Err(e) => {
                failed += 1;
                eprintln!("{service}: {e}");
            }
        }
    }

    Ok(if failed == 0 { 0 } else { 1 })
}

#[instrument(skip(args))]
async fn run_list(args: ManifestArgs) -> anyhow::Result<i32> {
    let (manifest_dir, manifest, _hash) = load_manifest(&args.manifest)?;
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();
    let statuses =
        workspace_orchestrator::list(&engine, &manifest_dir, &manifest, &cancel).await?;

    for s in statuses {
        println!("{}\t{}\t{}\t{:?}", s.service, s.path, s.account, s.state);
    }
    Ok(0)
}

#[instrument(skip(args))]
async fn run_up(args: WorkspaceUpArgs) -> anyhow::Result<i32> {
    let (manifest_dir, manifest, hash) = load_manifest(&args.manifest)?;
    let extra_ports = shared::parse_cli_ports(&args.ports)?;
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();

    let results = workspace_orchestrator::up(
        engine,
        &manifest_dir,
        &manifest,
        &hash,
        &args.services,
        &extra_ports,
        &cancel,
    )
    .await?;

    print_summary(&results)
}

#[instrument(skip(args))]
async fn run_down(args: WorkspaceServicesArgs) -> anyhow::Result<i32> {
    let (_manifest_dir, manifest, hash) = load_manifest(&args.manifest)?;
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();

    let results =
        workspace_orchestrator::down(&engine, &manifest, &hash, &args.services, &cancel).await?;
    print_summary(&results)
}

#[instrument(skip(args))]
async fn run_exec(args: WorkspaceExecArgs) -> anyhow::Result<i32> {
    let (_manifest_dir, _manifest, hash) = load_manifest(&args.manifest)?;
    let engine = BollardEngine::connect()?;
    let cancel = shared::ctrl_c_cancellation();

    let container_id = workspace_orchestrator::resolve_exec_target(
        &engine,
        &hash,
        &args.service,
        &cancel,
    )
    .await?;
    let code =
        reactor_core::session::attach(engine, &container_id, args.command, cancel).await?;
    Ok(code as i32)
}

fn print_summary(results: &[workspace_orchestrator::UpResult]) -> anyhow::Result<i32> {
    let mut failed = 0;
    for r in results {
        match &r.outcome {
            Ok(()) => println!("{}: ok", r.service),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", r.service);
            }
        }
    }
    println!("success: {}/{}", results.len() - failed, results.len());
    Ok(if failed == 0 { 0 } else { 1 })
}
