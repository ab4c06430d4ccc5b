//! Print a cached value

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use doccache_core::{CacheCategory, CachedValue, DocumentType};

use crate::output::{OutputFormat, write_json};
use crate::utils::Session;

/// Look the value up and render it. Errors when nothing is cached.
///
/// The snapshot is saved afterwards so access counts persist and
/// unreadable entries stay purged.
pub async fn execute_get<W: Write>(
    session: &Session,
    category: CacheCategory,
    requirement: &str,
    format: OutputFormat,
    mut writer: W,
) -> Result<()> {
    let value = session
        .cache()
        .get_cached_value(category, requirement)
        .await
        .context("Failed to read cache")?;
    session.save().await?;

    let Some(value) = value else {
        bail!("No cached {category} for this requirement");
    };

    match format {
        OutputFormat::Json => write_json(&mut writer, &value)?,
        OutputFormat::Text => render_text(&mut writer, &value)?,
    }
    Ok(())
}

fn render_text<W: Write>(writer: &mut W, value: &CachedValue) -> Result<()> {
    match value {
        CachedValue::Document(document) => {
            writeln!(writer, "{}", document.title.bold())?;
            writeln!(
                writer,
                "{}",
                format!("generated {}", document.created_at.to_rfc3339()).dimmed()
            )?;
            writeln!(writer)?;
            writeln!(writer, "{}", document.content)?;
        },
        CachedValue::Analysis(analysis) => {
            writeln!(writer, "{}", analysis.response)?;
            if !analysis.recommended_documents.is_empty() {
                let names: Vec<&str> = analysis
                    .recommended_documents
                    .iter()
                    .map(|doc| DocumentType::display_name(*doc))
                    .collect();
                writeln!(writer)?;
                writeln!(writer, "{} {}", "Recommended:".bold(), names.join(", "))?;
            }
        },
    }
    Ok(())
}

pub async fn run(
    session: &Session,
    category: CacheCategory,
    requirement: &str,
    format: OutputFormat,
) -> Result<()> {
    execute_get(session, category, requirement, format, io::stdout()).await
}
