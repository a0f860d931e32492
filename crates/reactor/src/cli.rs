use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser, Debug)]
#[command(name = "reactor", version, about = "Reproducible containerized dev environments for AI agents")]
pub struct Cli {
    /// Emit structured logs as line-delimited JSON instead of text.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recover/create the project container and attach an interactive session.
    Up(commands::up::UpArgs),
    /// Remove the project container.
    Down(commands::down::DownArgs),
    /// Build the project's image without starting a container.
    Build(commands::build::BuildArgs),
    /// Show the filesystem delta for a discovery-mode container.
    Diff(commands::diff::DiffArgs),
    /// Attach an interactive session running a specific command.
    Exec(commands::exec::ExecArgs),
    /// Scaffold a starter devcontainer.json.
    Init(commands::init::InitArgs),
    /// Multi-service workspace operations.
    #[command(subcommand)]
    Workspace(commands::workspace::WorkspaceCommand),
}

impl Cli {
    pub async fn dispatch(self) -> anyhow::Result<i32> {
        match self.command {
            Command::Up(args) => commands::up::run(args).await,
            Command::Down(args) => commands::down::run(args).await,
            Command::Build(args) => commands::build::run(args).await,
            Command::Diff(args) => commands::diff::run(args).await,
            Command::Exec(args) => commands::exec::run(args).await,
            Command::Init(args) => commands::init::run(args).await,
            Command::Workspace(cmd) => commands::workspace::run(cmd).await,
        }
    }
}
