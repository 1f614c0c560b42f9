//! article-refresh CLI: rewrite stored blog articles against fresh references.
//!
//! Finds reference articles for every pending original, scrapes them, asks a
//! language model for a rewrite, and stores the result in place.

mod commands;
mod progress;

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
