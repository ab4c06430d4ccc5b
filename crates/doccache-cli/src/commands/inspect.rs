//! List snapshot records without decrypting them

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use doccache_core::{Backup, BackupHeader};
use serde::Serialize;

use crate::output::{OutputFormat, format_bytes, write_json};
use crate::utils::session::read_backup;

/// Metadata of one record. Never includes payload bytes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub key: String,
    pub stored_bytes: u64,
    pub original_bytes: usize,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub encrypted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub header: BackupHeader,
    pub records: Vec<RecordSummary>,
}

impl From<Backup> for InspectReport {
    fn from(backup: Backup) -> Self {
        let records = backup
            .records
            .iter()
            .map(|record| RecordSummary {
                key: record.key.to_string(),
                stored_bytes: record.entry.stored_size(),
                original_bytes: record.entry.original_size,
                access_count: record.entry.access_count,
                created_at: record.entry.created_at,
                last_accessed_at: record.entry.last_accessed_at,
                encrypted: record.entry.is_encrypted(),
            })
            .collect();
        Self {
            header: backup.header,
            records,
        }
    }
}

pub fn execute_inspect<W: Write>(snapshot: &Path, format: OutputFormat, mut writer: W) -> Result<()> {
    let Some(backup) = read_backup(snapshot)? else {
        writeln!(writer, "{} No snapshot at {}", "ℹ".blue(), snapshot.display())?;
        return Ok(());
    };
    let report = InspectReport::from(backup);

    if format == OutputFormat::Json {
        return write_json(writer, &report);
    }

    let header = &report.header;
    writeln!(writer, "{}", "Snapshot".bold())?;
    writeln!(writer, "  Path:      {}", snapshot.display())?;
    writeln!(writer, "  Format:    v{}", header.format_version)?;
    writeln!(writer, "  Created:   {}", header.created_at.to_rfc3339())?;
    writeln!(writer, "  Encrypted: {}", header.encrypted)?;
    writeln!(writer, "  Records:   {}", header.entry_count)?;

    if report.records.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    for record in &report.records {
        writeln!(writer, "{}", record.key.cyan())?;
        writeln!(
            writer,
            "  {} stored, {} original, {} accesses, last used {}",
            format_bytes(record.stored_bytes),
            format_bytes(record.original_bytes as u64),
            record.access_count,
            record.last_accessed_at.to_rfc3339()
        )?;
    }
    Ok(())
}

pub fn run(snapshot: &Path, format: OutputFormat) -> Result<()> {
    execute_inspect(snapshot, format, io::stdout())
}
