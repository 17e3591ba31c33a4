#![allow(clippy::unused_async)]

//! Authn custom resource CLI
//!
//! Handles lifecycle and rotation events from the command line

use authn_cr::cli::{Cli, Runner};
use authn_cr::config::Settings;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(settings.log_directive(cli.verbose))
                }),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(cli, settings);

    if let Err(e) = runner.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
