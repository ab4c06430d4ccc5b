//! Purge idle entries

use std::io::{self, Write};

use anyhow::Result;
use colored::Colorize;

use crate::utils::Session;

pub async fn execute_optimize<W: Write>(session: &Session, mut writer: W) -> Result<usize> {
    let purged = session.cache().optimize_for_memory().await;
    session.save().await?;

    let remaining = session.cache().get_cache_statistics().await.item_count;
    writeln!(
        writer,
        "{} Purged {purged} idle entries, {remaining} remaining",
        "✓".green()
    )?;
    Ok(purged)
}

pub async fn run(session: &Session) -> Result<()> {
    execute_optimize(session, io::stdout()).await.map(|_| ())
}
