mod cli;
mod commands;
mod ui;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    reactor_core::logging::init(cli.json_logs)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let code = cli.dispatch().await?;
    std::process::exit(code);
}
