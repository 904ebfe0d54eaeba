use anyhow::Result;
use clap::Parser;

use watchpost_core::config::WatchpostConfig;
use watchpost_daemon::cli::DaemonCli;
use watchpost_daemon::logging;
use watchpost_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> environment -> command line, then validate the merged result
    let mut config = WatchpostConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "watchpost-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await
}
