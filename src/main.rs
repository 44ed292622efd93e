use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod archive;
mod config;
mod error;
mod export;
mod models;
mod sanitize;

use config::{Cli, Config};

// Всё строго последовательно, поэтому хватает однопоточного runtime
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let result = if cli.dummy {
        Config::write_dummy(&cli.config).await
    } else {
        info!(
            "Starting toot export - config: {}, statuses: {}",
            cli.config.display(),
            cli.statuses.display()
        );
        export::run(&cli).await
    };

    // Единственное место, где решается код выхода
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Export aborted, archive left untouched: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Инициализирует систему логирования с использованием tracing
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .init();
}
