use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

mod archive;
mod engine;
mod env;
mod error;
mod github;
mod networking;
mod publisher;
mod releases;
mod server;
mod storage;
mod updater;
mod util;

#[cfg(test)]
mod testing;

use crate::engine::Mirror;
use crate::env::Config;
use crate::server::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "tibia-release-mirror",
    author,
    version,
    about = "Mirrors new Tibia launcher builds as GitHub release assets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the vendor once and publish a new launcher build if there is one.
    Run,
    /// Serve the authenticated HTTP trigger.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = server::DEFAULT_BIND)]
        bind: String,
        /// Answer triggers before the upload finishes and publish in the background.
        #[arg(long)]
        background: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run => run_once().await,
        Command::Serve { bind, background } => {
            let state = AppState::from_config(Config::from_env(), background);
            match server::serve(&bind, Arc::new(state)).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!("{err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run_once() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(err.exit_code());
        }
    };

    match Mirror::from_config(&config, false).run().await {
        Ok(outcome) => {
            info!("run finished: {outcome:?}");
            ExitCode::from(outcome.exit_code())
        }
        Err(err) => {
            error!("run failed ({}): {err}", err.kind());
            ExitCode::from(err.exit_code())
        }
    }
}
