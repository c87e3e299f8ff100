//! windowcast: command-line front end for the capture engine.
//!
//! ```text
//! windowcast windows [--app <substr>]
//! windowcast probe
//! windowcast capture --window <id> | --app <name> [--title <substr>] \
//!     [--frames N] [--format raw|jpeg|png] [--out DIR] [--config FILE]
//! ```
//!
//! Log level follows `RUST_LOG` (default `info`).

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!("windowcast v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Windows { app } => commands::list_windows(app.as_deref()),
        Command::Probe => commands::probe(),
        Command::Capture(args) => commands::capture(args).await,
    }
}
