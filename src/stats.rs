//! Index statistics and health overview.
//!
//! Quick summary of what's indexed: document and chunk counts, embedding
//! coverage, and the pinned embedding space. Used by `wikiqa stats` to
//! confirm ingestion is doing what it should.

use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::error::Result;

pub async fn run_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(pool)
        .await?;

    let linked_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE origin_url IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let meta = sqlx::query("SELECT model, dims FROM index_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("wikiqa — index stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {} ({} with wiki links)", total_docs, linked_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors * 100) / total_chunks
        } else {
            0
        }
    );

    if let Some(row) = meta {
        let model: String = row.get("model");
        let dims: i64 = row.get("dims");
        println!("  Embedding:   {} ({} dims)", model, dims);
    } else {
        println!("  Embedding:   (index empty)");
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
