//! Cache statistics command implementation

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use doccache_core::{AdaptiveMetrics, CacheStatistics};
use serde::Serialize;

use crate::output::{OutputFormat, format_bytes, write_json};
use crate::utils::Session;

/// Everything `stats` reports.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub snapshot: PathBuf,
    pub statistics: CacheStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive: Option<AdaptiveMetrics>,
}

pub async fn collect(session: &Session) -> StatsReport {
    StatsReport {
        snapshot: session.snapshot_path().to_path_buf(),
        statistics: session.cache().get_cache_statistics().await,
        adaptive: session.cache().get_adaptive_metrics().await,
    }
}

pub fn render<W: Write>(mut writer: W, report: &StatsReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return write_json(writer, report);
    }

    let stats = &report.statistics;
    writeln!(writer, "{}", "Cache Statistics".bold())?;
    writeln!(writer, "  Snapshot:     {}", report.snapshot.display())?;
    writeln!(
        writer,
        "  Items:        {} ({} documents, {} analyses)",
        stats.item_count, stats.document_count, stats.analysis_count
    )?;
    writeln!(writer, "  Size:         {}", format_bytes(stats.byte_size))?;
    writeln!(
        writer,
        "  Encryption:   {}",
        if stats.encrypted {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    )?;
    writeln!(writer, "  Hit rate:     {:.1}%", stats.hit_rate * 100.0)?;
    writeln!(writer, "  Evictions:    {}", stats.evictions)?;
    if stats.integrity_failures > 0 {
        writeln!(
            writer,
            "  Integrity:    {}",
            format!("{} failed reads", stats.integrity_failures).red()
        )?;
    }
    if !stats.top_categories.is_empty() {
        writeln!(writer, "  Top categories:")?;
        for usage in &stats.top_categories {
            writeln!(
                writer,
                "    {:<28} {} accesses",
                usage.category.slug(),
                usage.access_count
            )?;
        }
    }

    if let Some(adaptive) = &report.adaptive {
        writeln!(writer)?;
        writeln!(writer, "{}", "Adaptive Sizing".bold())?;
        writeln!(writer, "  Pressure:     {}", adaptive.pressure_level)?;
        writeln!(
            writer,
            "  Limits:       {} items, {}",
            adaptive.current_limits.max_item_count,
            format_bytes(adaptive.current_limits.max_total_bytes)
        )?;
        writeln!(
            writer,
            "  Usage:        {} items, {}",
            adaptive.actual_usage.item_count,
            format_bytes(adaptive.actual_usage.total_bytes)
        )?;
        writeln!(writer, "  Adjustments:  {}", adaptive.adjustment_count)?;
    }
    Ok(())
}

pub async fn run(session: &Session, format: OutputFormat) -> Result<()> {
    let report = collect(session).await;
    render(io::stdout(), &report, format)
}
