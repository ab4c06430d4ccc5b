//! Configuration commands

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use doccache_core::CacheConfig;

use crate::cli::ConfigCommands;
use crate::output::{OutputFormat, write_json};
use crate::utils::load_config;

/// Print the effective configuration and where it came from.
pub fn execute_show<W: Write>(
    preset: Option<&str>,
    config_path: &Path,
    format: OutputFormat,
    mut writer: W,
) -> Result<()> {
    let config = load_config(preset, config_path)?;
    if format == OutputFormat::Json {
        return write_json(writer, &config);
    }

    let source = match preset {
        Some(name) => format!("preset '{name}'"),
        None if config_path.exists() => config_path.display().to_string(),
        None => "built-in defaults".to_string(),
    };
    writeln!(writer, "{}", format!("# source: {source}").dimmed())?;
    write!(writer, "{}", toml::to_string_pretty(&config)?)?;
    Ok(())
}

/// Write `preset` to `config_path`.
pub fn execute_init<W: Write>(
    preset: &str,
    config_path: &Path,
    force: bool,
    mut writer: W,
) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    let config = CacheConfig::preset(preset)?;
    config
        .save_to(config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    writeln!(
        writer,
        "{} Wrote {} configuration to {}",
        "✓".green(),
        preset.bold(),
        config_path.display()
    )?;
    Ok(())
}

pub fn run(command: ConfigCommands, preset: Option<&str>, config_path: &Path) -> Result<()> {
    match command {
        ConfigCommands::Show { format } => execute_show(preset, config_path, format, io::stdout()),
        ConfigCommands::Init { from, force } => execute_init(&from, config_path, force, io::stdout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::session::test_support::temp_locations;

    #[test]
    fn test_init_then_show() -> Result<()> {
        let (_dir, locations) = temp_locations();
        execute_init("performance", &locations.config, false, Vec::new())?;

        let mut out = Vec::new();
        execute_show(None, &locations.config, OutputFormat::Json, &mut out)?;
        let shown: CacheConfig = serde_json::from_slice(&out)?;
        assert_eq!(shown, CacheConfig::performance());
        Ok(())
    }

    #[test]
    fn test_init_refuses_to_overwrite() -> Result<()> {
        let (_dir, locations) = temp_locations();
        execute_init("standard", &locations.config, false, Vec::new())?;
        assert!(execute_init("secure", &locations.config, false, Vec::new()).is_err());
        execute_init("secure", &locations.config, true, Vec::new())?;
        assert!(CacheConfig::load_from(&locations.config)?.encryption_enabled);
        Ok(())
    }

    #[test]
    fn test_show_text_names_source() -> Result<()> {
        let (_dir, locations) = temp_locations();
        let mut out = Vec::new();
        execute_show(Some("minimal"), &locations.config, OutputFormat::Text, &mut out)?;
        let rendered = String::from_utf8(out)?;
        assert!(rendered.contains("preset 'minimal'"));
        assert!(rendered.contains("max_items = 20"));
        Ok(())
    }
}
