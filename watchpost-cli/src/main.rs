use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use watchpost_cli::cli::{Cli, Commands};
use watchpost_cli::commands;
use watchpost_cli::error::CliError;
use watchpost_cli::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // diagnostics go to stderr so stdout stays parseable with --output json
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let writer = OutputWriter::new(cli.output);
    let result: Result<(), CliError> = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &cli.config, &writer).await,
        Commands::Replay(args) => commands::replay::execute(args, &cli.config, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        // the scan report already says what was found
        Err(e @ CliError::Detected(_)) => ExitCode::from(e.exit_code()),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
