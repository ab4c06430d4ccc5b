//! Logging initialization and color control.

use anyhow::Result;
use colored::control as color_control;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::output::OutputFormat;

/// Level selected by the global flags. JSON output drops to `ERROR` unless
/// `--verbose` was given, so stderr stays quiet for scripts.
pub fn log_level(cli: &Cli) -> Level {
    if cli.verbose {
        return Level::DEBUG;
    }
    if cli.quiet || machine_output(cli) {
        return Level::ERROR;
    }
    Level::WARN
}

fn machine_output(cli: &Cli) -> bool {
    let format = match &cli.command {
        Commands::Get(args) => Some(args.format),
        Commands::Stats { format }
        | Commands::Inspect { format }
        | Commands::Config {
            command: ConfigCommands::Show { format },
        } => Some(*format),
        _ => None,
    };
    format == Some(OutputFormat::Json)
}

/// Install the global subscriber and apply color settings.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let env_no_color = std::env::var_os("NO_COLOR").is_some();
    if cli.no_color || env_no_color || machine_output(cli) {
        color_control::set_override(false);
    }
    Ok(())
}
