mod backend;
mod cmd;
mod config;
mod error;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;
use config::{BridgeConfig, Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Логирование настраивается из конфига, поэтому ошибки до него идут в stderr.
    let config = match BridgeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let guard = match telemetry::init(&config.log) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(config = %cli.config, "configuration loaded");

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(config, args).await,
        Commands::Preview(args) => cmd::preview::run(config, args).await,
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "kafka-bridge failed");
            ExitCode::FAILURE
        }
    };
    drop(guard);
    code
}
