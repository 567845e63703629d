#![doc = include_str!("../README.md")]

mod commands;
mod config;
mod store;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;
use config::CliArgs;
use telemetry::init_telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_telemetry(args.log_json)?;

    match commands::run(args).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::error!("{err:#}");
            Ok(commands::exit_code(&err))
        }
    }
}
