//! # CLI Structure and Argument Parsing
//!
//! `doccache` maintains a cache snapshot on disk: a backup produced by
//! `DocumentCache::export_encrypted_backup`, together with the key file that
//! sealed it. Every command loads the snapshot into a fresh cache, runs, and
//! writes the snapshot back when the cache changed.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Cache a statement of work and read it back
//! doccache put sow "Build a website" --file sow.md
//! doccache get sow "build a website"
//!
//! # Analysis responses use the `analysis` category
//! doccache put analysis "Build a website" --content "Start with a PWS" --recommend pws,qasp
//!
//! # Maintenance
//! doccache stats --format json
//! doccache inspect
//! doccache rotate-key
//! doccache clear --force
//! ```
//!
//! ## Global Options
//!
//! - `--config`, `--preset`: choose the cache configuration
//! - `--snapshot`, `--key-file`: override the data file locations
//! - `--verbose`, `--quiet`, `--no-color`: logging and color control

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use doccache_core::CacheCategory;

use crate::output::OutputFormat;

/// Main CLI structure for the `doccache` command
#[derive(Parser, Clone, Debug)]
#[command(name = "doccache")]
#[command(version)]
#[command(about = "doccache - maintain an encrypted document cache snapshot", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "DOCCACHE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use a named preset (standard, secure, performance, minimal) instead of
    /// the configuration file
    #[arg(long, global = true, value_name = "NAME", conflicts_with = "config")]
    pub preset: Option<String>,

    /// Snapshot file (defaults to the platform data directory)
    #[arg(long, global = true, env = "DOCCACHE_SNAPSHOT", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Encryption key file (defaults to the platform data directory)
    #[arg(long, global = true, env = "DOCCACHE_KEY_FILE", value_name = "PATH")]
    pub key_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Cache a generated document or an analysis response
    Put(PutArgs),

    /// Print a cached value
    Get(GetArgs),

    /// Show cache statistics and adaptive sizing state
    Stats {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List snapshot records without decrypting them
    Inspect {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Re-encrypt every entry under a freshly generated key
    RotateKey,

    /// Purge idle entries and recompute adaptive limits
    Optimize,

    /// Remove every cached entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Clone, Debug)]
pub struct PutArgs {
    /// Document type slug (for example `sow`, `pws`, `cost-estimate`) or `analysis`
    pub category: CacheCategory,

    /// Requirement text the value was generated for
    pub requirement: String,

    /// Value content; read from --file or stdin when omitted
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,

    /// Read the content from a file
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Document title (defaults to the document type's name)
    #[arg(long)]
    pub title: Option<String>,

    /// Recommended document types, for analysis responses
    #[arg(long, value_delimiter = ',', value_name = "TYPES")]
    pub recommend: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct GetArgs {
    /// Document type slug or `analysis`
    pub category: CacheCategory,

    /// Requirement text
    pub requirement: String,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Write a configuration file from a preset
    Init {
        /// Preset to start from
        #[arg(long, default_value = "standard")]
        from: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use doccache_core::DocumentType;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_put_parses_category_and_recommendations() {
        let cli = Cli::try_parse_from([
            "doccache",
            "put",
            "analysis",
            "Build a website",
            "--content",
            "Start with a PWS",
            "--recommend",
            "pws,qasp",
        ])
        .expect("valid arguments");

        let Commands::Put(args) = cli.command else {
            panic!("expected put");
        };
        assert_eq!(args.category, CacheCategory::Analysis);
        assert_eq!(args.recommend, vec!["pws", "qasp"]);
    }

    #[test]
    fn test_get_rejects_unknown_category() {
        assert!(Cli::try_parse_from(["doccache", "get", "memo", "x"]).is_err());
        let cli = Cli::try_parse_from(["doccache", "get", "cost-estimate", "x", "-f", "json"])
            .expect("valid arguments");
        let Commands::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.category, CacheCategory::Document(DocumentType::CostEstimate));
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["doccache", "stats", "--quiet", "--no-color"])
            .expect("valid arguments");
        assert!(cli.quiet && cli.no_color);
        assert!(Cli::try_parse_from(["doccache", "stats", "-q", "-v"]).is_err());
    }
}
