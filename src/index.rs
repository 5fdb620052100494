//! Durable vector index over SQLite.
//!
//! Stores one row per chunk: the embedding vector (little-endian f32 BLOB)
//! plus the metadata needed for attribution. Upserts are keyed by chunk id,
//! so deterministic ids make re-ingestion idempotent. A single `index_meta`
//! row pins the embedding model and dimensionality the index was built
//! with; anything inconsistent with it is rejected before touching data.

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Result, WikiqaError};
use crate::models::{IndexEntry, RetrievedChunk};

pub struct VectorIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl VectorIndex {
    /// Bind the index to a pool and the configured embedding space.
    ///
    /// If the index already holds entries for a different dimensionality or
    /// model, opening fails rather than silently mixing vector spaces.
    pub async fn open(pool: SqlitePool, model: &str, dims: usize) -> Result<Self> {
        let meta: Option<(String, i64)> =
            sqlx::query_as("SELECT model, dims FROM index_meta WHERE id = 1")
                .fetch_optional(&pool)
                .await?;

        match meta {
            Some((stored_model, stored_dims)) => {
                if stored_dims as usize != dims {
                    return Err(WikiqaError::Dimension {
                        expected: stored_dims as usize,
                        actual: dims,
                    });
                }
                if stored_model != model {
                    return Err(WikiqaError::Config(format!(
                        "index was built with embedding model '{}'; configured model is '{}'",
                        stored_model, model
                    )));
                }
            }
            None => {
                sqlx::query("INSERT INTO index_meta (id, model, dims) VALUES (1, ?, ?)")
                    .bind(model)
                    .bind(dims as i64)
                    .execute(&pool)
                    .await?;
            }
        }

        Ok(Self {
            pool,
            model: model.to_string(),
            dims,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Insert or fully replace entries, keyed by chunk id.
    ///
    /// All-or-nothing: the whole batch runs in one transaction, and a
    /// dimensionality mismatch anywhere in it aborts before any write, so
    /// existing entries are never corrupted by a bad batch.
    pub async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        for entry in entries {
            if entry.vector.len() != self.dims {
                return Err(WikiqaError::Dimension {
                    expected: self.dims,
                    actual: entry.vector.len(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, origin_url, source_kind, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    origin_url = excluded.origin_url,
                    source_kind = excluded.source_kind,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(&entry.origin_url)
            .bind(&entry.source_kind)
            .bind(self.dims as i64)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = entries.len(), "upserted index entries");
        Ok(())
    }

    /// Return up to `k` entries ordered by descending cosine similarity.
    /// Ties break on (document_id, chunk_index), i.e. original document
    /// order, so results are stable.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if vector.len() != self.dims {
            return Err(WikiqaError::Dimension {
                expected: self.dims,
                actual: vector.len(),
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.origin_url, cv.embedding,
                   c.chunk_index, c.text, d.title
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    score: cosine_similarity(vector, &stored),
                    text: row.get("text"),
                    title: row.get("title"),
                    origin_url: row.get("origin_url"),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Number of vectors currently stored.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Raw stored rows for one chunk id, used to verify overwrite behavior.
    pub async fn get_raw(&self, chunk_id: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT embedding FROM chunk_vectors WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("embedding")))
    }
}
