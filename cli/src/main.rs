mod cli;
mod commands;
mod context;
mod print;

use crate::cli::{Cli, Commands};
use crate::context::Context;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use std::io;
use tracing_subscriber::{EnvFilter, prelude::*};
use updraft::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::Completion { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = env!("CARGO_BIN_NAME");
        generate(shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let config = Config::new()?;
    let context = Context::open(config).await?;

    let result = match cli.command {
        Commands::Deepcheck => commands::storage::deepcheck(&context).await,
        Commands::Unlock { app } => commands::storage::unlock(&context, &app).await,
        Commands::Apps { command } => command.handle(&context).await,
        Commands::Channels { command } => command.handle(&context).await,
        Commands::Drafts { command } => command.handle(&context).await,
        Commands::Versions { command } => command.handle(&context).await,
        Commands::Regenerate { target } => commands::versions::regenerate(&context, &target).await,
        Commands::Completion { .. } => Ok(()),
    };

    context.shutdown().await;
    result
}
