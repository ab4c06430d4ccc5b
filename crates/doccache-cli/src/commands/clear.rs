//! Cache clearing command implementation

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::warn;

use crate::utils::session::read_backup;

/// What [`execute_clear`] did.
#[derive(Debug, PartialEq, Eq)]
pub enum ClearOutcome {
    /// No snapshot, or one without records.
    AlreadyEmpty,
    /// User cancelled the clear operation.
    Cancelled,
    /// Snapshot removed. `cleared` is `None` when its header was unreadable.
    Cleared { cleared: Option<usize> },
}

/// Remove the snapshot file. The key file is kept.
///
/// An undecodable snapshot is still removed, so this is the way out when
/// the key that sealed it is gone.
pub fn execute_clear<W, C>(
    snapshot: &Path,
    mut writer: W,
    force: bool,
    mut confirm: C,
) -> Result<ClearOutcome>
where
    W: Write,
    C: FnMut(Option<usize>) -> Result<bool>,
{
    if !snapshot.exists() {
        writeln!(writer, "{} Cache is already empty", "ℹ".blue())?;
        return Ok(ClearOutcome::AlreadyEmpty);
    }

    let count = match read_backup(snapshot) {
        Ok(backup) => backup.map(|backup| backup.header.entry_count),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "snapshot is unreadable; clearing anyway");
            None
        },
    };
    if count == Some(0) {
        fs::remove_file(snapshot)
            .with_context(|| format!("Failed to remove {}", snapshot.display()))?;
        writeln!(writer, "{} Cache is already empty", "ℹ".blue())?;
        return Ok(ClearOutcome::AlreadyEmpty);
    }

    let described = count.map_or_else(|| "an unreadable number of".to_string(), |n| n.to_string());
    writeln!(
        writer,
        "{} This will permanently delete {described} cached entries in {}",
        "⚠".yellow(),
        snapshot.display()
    )?;

    if !force && !confirm(count)? {
        writeln!(writer, "{} Cancelled", "✗".red())?;
        return Ok(ClearOutcome::Cancelled);
    }

    fs::remove_file(snapshot).with_context(|| format!("Failed to remove {}", snapshot.display()))?;
    writeln!(writer, "{} Cache cleared successfully", "✓".green())?;
    Ok(ClearOutcome::Cleared { cleared: count })
}

/// Clear the snapshot using terminal IO for confirmation.
pub fn run(snapshot: &Path, force: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let mut input = String::new();

    execute_clear(snapshot, &mut stdout_lock, force, |_count| {
        let prompt_stdout = io::stdout();
        let mut prompt_lock = prompt_stdout.lock();
        write!(prompt_lock, "Are you sure you want to continue? [y/N] ")?;
        prompt_lock.flush()?;

        input.clear();
        io::stdin().read_line(&mut input)?;

        Ok(matches!(
            input.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    })?;

    Ok(())
}
