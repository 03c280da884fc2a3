mod analyzer;
mod backends;
mod cli;
mod config;
mod error;
mod executor;
mod jenkins;
mod models;
mod output;
mod tracker;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting CITriage - AI-assisted Jenkins failure triage");
    cli.execute().await?;

    Ok(())
}
