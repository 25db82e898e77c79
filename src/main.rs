//! Historian-Archive: Main entry point

use clap::Parser;
use historian_archive::cli::{run, Cli};
use historian_archive::error::Result;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
