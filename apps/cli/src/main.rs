//! Changelog bot CLI.
//!
//! Extracts changelog blocks from merged pull requests, stores them as part
//! records, and publishes them to the game repository.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
