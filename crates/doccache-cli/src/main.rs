//! doccache CLI - maintain an encrypted document cache snapshot
//!
//! This is the main entry point for the doccache command-line interface.
//! Command implementations live in separate modules under `commands`.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod output;
mod utils;

use cli::{Cli, Commands};
use utils::{Locations, Session, initialize_logging, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    let locations = Locations::resolve(&cli)?;
    let preset = cli.preset.as_deref();

    match cli.command {
        Commands::Config { command } => commands::config::run(command, preset, &locations.config),
        Commands::Inspect { format } => commands::inspect::run(&locations.snapshot, format),
        Commands::Clear { force } => commands::clear::run(&locations.snapshot, force),
        Commands::Put(args) => {
            let session = open_session(preset, &locations).await?;
            commands::put::run(&session, &args).await
        },
        Commands::Get(args) => {
            let session = open_session(preset, &locations).await?;
            commands::get::run(&session, args.category, &args.requirement, args.format).await
        },
        Commands::Stats { format } => {
            let session = open_session(preset, &locations).await?;
            commands::stats::run(&session, format).await
        },
        Commands::RotateKey => {
            let session = open_session(preset, &locations).await?;
            commands::rotate_key::run(&session).await
        },
        Commands::Optimize => {
            let session = open_session(preset, &locations).await?;
            commands::optimize::run(&session).await
        },
    }
}

async fn open_session(preset: Option<&str>, locations: &Locations) -> Result<Session> {
    let config = load_config(preset, &locations.config)?;
    Session::open(config, locations).await
}
