//! shelflife - turn receipt photos into a food inventory with expiry dates.

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose { "shelflife=debug,info" } else { "info" };
    shelflife::telemetry::init_tracing(Some(default_filter), cli.json_logs)?;

    cli::run(cli).await
}
