//! strata entry point.
//!
//! ```bash
//! cargo run -p strata-cli -- ls file:///tmp
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "starting");

    let mut stdout = std::io::stdout().lock();
    strata_cli::run(cli, &mut stdout).await
}
