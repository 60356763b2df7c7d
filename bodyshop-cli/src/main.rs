mod cli;
mod commands;
mod config;
mod logging;
mod session_store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env.bodyshop
    dotenvy::from_filename(".env.bodyshop").ok();

    let cli = Cli::parse();
    logging::init_tracing(cli.verbose)?;

    commands::run(cli.command).await
}
