//! Key rotation command implementation

use std::io::{self, Write};

use anyhow::{Result, bail};
use colored::Colorize;
use doccache_core::{Error, RotationSummary};

use crate::utils::Session;

/// Rotate the key, then save the snapshot under it.
pub async fn execute_rotate<W: Write>(session: &Session, mut writer: W) -> Result<RotationSummary> {
    let summary = match session.rotate_key().await {
        Ok(summary) => summary,
        Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::EncryptionNotEnabled)) => {
            bail!("Encryption is disabled; set encryption_enabled or use --preset secure")
        },
        Err(err) => return Err(err),
    };

    writeln!(
        writer,
        "{} Rotated encryption key ({} re-encrypted)",
        "✓".green(),
        summary.reencrypted
    )?;
    if summary.purged > 0 {
        writeln!(
            writer,
            "{} Dropped {} entries that could not be opened under the old key",
            "⚠".yellow(),
            summary.purged
        )?;
    }
    Ok(summary)
}

pub async fn run(session: &Session) -> Result<()> {
    execute_rotate(session, io::stdout()).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Locations;
    use crate::utils::session::test_support::temp_locations;
    use doccache_core::{CacheConfig, DocumentType, GeneratedDocument};

    #[tokio::test]
    async fn test_rotation_keeps_snapshot_readable() -> Result<()> {
        // Given: a saved snapshot with two documents
        let (_dir, locations) = temp_locations();
        let session = Session::open(CacheConfig::secure(), &locations).await?;
        for (req, body) in [("a", "alpha"), ("b", "beta")] {
            let doc = GeneratedDocument::new(DocumentType::Sow, body);
            session.cache().cache_document(req, &doc).await?;
        }
        session.save().await?;
        let old_key = std::fs::read(&locations.key_file)?;

        // When: the key is rotated
        let mut out = Vec::new();
        let summary = execute_rotate(&session, &mut out).await?;

        // Then: the key file changed and a new session reads both entries
        assert_eq!(summary.reencrypted, 2);
        assert_ne!(std::fs::read(&locations.key_file)?, old_key);
        let reopened = Session::open(CacheConfig::secure(), &locations).await?;
        let read = reopened
            .cache()
            .get_cached_document(DocumentType::Sow, "b")
            .await?;
        assert_eq!(read.map(|doc| doc.content), Some("beta".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_rotation_without_encryption_explains() -> Result<()> {
        let (_dir, locations) = temp_locations();
        let session = Session::open(CacheConfig::standard(), &locations).await?;
        let err = execute_rotate(&session, Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("Encryption is disabled"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_save_restores_previous_key() -> Result<()> {
        // Given: a saved snapshot, and a session whose snapshot path is a directory
        let (dir, locations) = temp_locations();
        let session = Session::open(CacheConfig::secure(), &locations).await?;
        let doc = GeneratedDocument::new(DocumentType::Sow, "kept");
        session.cache().cache_document("req", &doc).await?;
        session.save().await?;
        let old_key = std::fs::read(&locations.key_file)?;

        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("occupied"))?;
        let unwritable = Locations {
            snapshot: blocked,
            ..locations.clone()
        };
        let failing = Session::open_empty(CacheConfig::secure(), &unwritable)?;

        // When: the key rotates but the snapshot cannot be written
        let err = execute_rotate(&failing, Vec::new()).await.unwrap_err();

        // Then: the old key is back and the original snapshot still opens
        assert!(format!("{err:#}").contains("rolled back"));
        assert_eq!(std::fs::read(&locations.key_file)?, old_key);
        let reopened = Session::open(CacheConfig::secure(), &locations).await?;
        let read = reopened
            .cache()
            .get_cached_document(DocumentType::Sow, "req")
            .await?;
        assert_eq!(read.map(|doc| doc.content), Some("kept".to_string()));
        Ok(())
    }
}
