//! # nbank entry point
//!
//! Parses arguments, sets up logging, and hands off to [`nbank_cli::cli::dispatch`].

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nbank_cli::cli::{dispatch, is_auth_failure, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --debug.
    let default = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        run_time = %chrono::Local::now().to_rfc3339(),
        "nbank starting"
    );

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            if is_auth_failure(&e) {
                tracing::error!("authentication error: supply credentials with '-a user:password' or a .netrc entry");
            }
            ExitCode::from(1)
        }
    }
}
