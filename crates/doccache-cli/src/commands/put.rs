//! Cache a document or analysis response

use std::io::{self, Read, Write};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use doccache_core::{AnalysisResponse, CacheCategory, CachedValue, DocumentType, GeneratedDocument};

use crate::cli::PutArgs;
use crate::output::format_bytes;
use crate::utils::Session;

/// Turn the arguments and content into the value to store.
pub fn build_value(args: &PutArgs, content: String) -> Result<CachedValue> {
    match args.category {
        CacheCategory::Document(document_type) => {
            if !args.recommend.is_empty() {
                bail!("--recommend only applies to analysis responses");
            }
            let mut document = GeneratedDocument::new(document_type, content);
            if let Some(title) = &args.title {
                document = document.with_title(title.as_str());
            }
            Ok(CachedValue::Document(document))
        },
        CacheCategory::Analysis => {
            if args.title.is_some() {
                bail!("--title only applies to documents");
            }
            let recommended_documents = args
                .recommend
                .iter()
                .map(|slug| slug.parse::<DocumentType>())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CachedValue::Analysis(AnalysisResponse {
                response: content,
                recommended_documents,
            }))
        },
    }
}

/// Store the value and persist the snapshot.
pub async fn execute_put<W: Write>(
    session: &Session,
    args: &PutArgs,
    content: String,
    mut writer: W,
) -> Result<()> {
    let value = build_value(args, content)?;
    session
        .cache()
        .cache_value(args.category, &args.requirement, &value)
        .await
        .context("Failed to cache value")?;
    session.save().await?;

    let stats = session.cache().get_cache_statistics().await;
    writeln!(
        writer,
        "{} Cached {} ({} items, {})",
        "✓".green(),
        args.category.to_string().bold(),
        stats.item_count,
        format_bytes(stats.byte_size)
    )?;
    Ok(())
}

fn read_content(args: &PutArgs) -> Result<String> {
    if let Some(content) = &args.content {
        return Ok(content.clone());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read content from stdin")?;
    Ok(content)
}

pub async fn run(session: &Session, args: &PutArgs) -> Result<()> {
    let content = read_content(args)?;
    execute_put(session, args, content, io::stdout()).await
}
