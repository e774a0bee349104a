mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress streams to stderr; stdout carries the summary/output only.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Purge { ref memory_id } => {
            commands::purge::run(&cli.region, memory_id, cli.format).await
        }
        Commands::Preferences {
            ref memory_id,
            ref actor,
            ref session,
            ref query,
        } => {
            commands::preferences::run(
                &cli.region,
                memory_id,
                actor,
                session.as_deref(),
                query,
                cli.format,
            )
            .await
        }
        Commands::Price { ref name } => commands::price::run(name, cli.format).await,
    }
}
