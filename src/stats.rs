//! Collection statistics.
//!
//! Summarises what is stored in the shared collection: PDF chunks, distinct
//! PDF files, and conversation entries by role. Used by `pdfchat stats`
//! and `GET /stats`.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::conversation::ConversationStats;
use crate::models::{ChunkMetadata, SourceType};
use crate::store::{CollectionHandle, RetrievalError, SqliteStore, VectorStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_entries: usize,
    pub pdf_chunks: usize,
    pub pdf_files: usize,
    pub conversation: ConversationStats,
}

/// Scan the collection once and tally every entry.
pub async fn collect_stats(
    store: &dyn VectorStore,
    collection: &CollectionHandle,
) -> Result<CollectionStats, RetrievalError> {
    let entries = store.get_all(collection).await?;

    let mut files = BTreeSet::new();
    let mut pdf_chunks = 0;
    for meta in entries.iter().filter_map(|e| ChunkMetadata::from_map(&e.metadata)) {
        if meta.source_type == SourceType::Pdf {
            pdf_chunks += 1;
            if let Some(name) = meta.filename {
                files.insert(name);
            }
        }
    }

    Ok(CollectionStats {
        collection: collection.name().to_string(),
        total_entries: entries.len(),
        pdf_chunks,
        pdf_files: files.len(),
        conversation: ConversationStats::tally(&entries),
    })
}

/// Run the stats command: scan the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let collection = store.ensure_collection(&config.store.collection).await?;
    let stats = collect_stats(&store, &collection).await;
    store.close().await;
    let stats = stats?;

    let db_path = config.store.resolved_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("pdfchat stats");
    println!("=============");
    println!();
    println!("  Database:      {}", db_path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!("  Collection:    {}", stats.collection);
    println!();
    println!("  Entries:       {}", stats.total_entries);
    println!("  PDF chunks:    {}", stats.pdf_chunks);
    println!("  PDF files:     {}", stats.pdf_files);
    println!();
    println!("  Conversation:  {}", stats.conversation.total);
    println!("    user:        {}", stats.conversation.user_messages);
    println!("    assistant:   {}", stats.conversation.assistant_messages);
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
