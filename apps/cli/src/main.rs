//! FirstParty CLI — run the first-party-data pipeline from the command line.
//!
//! Bootstraps the FPD module into an in-process host, registers the
//! built-in submodules, and pushes an auction-start request through it.

mod commands;
mod host;

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
