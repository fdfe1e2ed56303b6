use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use webshot::{load_config, setup_logging, spawn_shutdown_handler, Cli, CliRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting webshot v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&args).await?;

    // Stop on signal or when the lifetime runs out
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _shutdown_handler = spawn_shutdown_handler(shutdown_tx, config.max_lifetime);

    let cli_runner = CliRunner::new(config, shutdown_rx);

    if let Err(e) = cli_runner.run(args.command).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }

    info!("webshot stopped");
    Ok(())
}
