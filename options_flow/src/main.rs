use clap::Parser;
use options_flow::{
    cli::{
        commands,
        params::{Cli, Command},
    },
    config::FlowConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared_utils::logging::init_tracing();
    let cli = Cli::parse();

    let config = FlowConfig::resolve(cli.config.as_deref())?;
    info!(
        storage_root = %config.storage_root.display(),
        tickers = config.tracked_tickers.len(),
        "configuration loaded"
    );

    match cli.command {
        Command::Run { ticker, no_chart } => commands::run(&config, ticker, !no_chart).await,
        Command::Poll => commands::poll_once(&config).await,
        Command::Chart { ticker, start, end } => {
            commands::chart_once(&config, &ticker, start, end)
        }
    }
}
