//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: source scan → extraction → chunking →
//! embedding → index upsert. Documents are processed in parallel up to a
//! configured limit; their chunks are funneled through one bounded channel
//! so embedding batches coalesce across documents and the remote service
//! sees full batches instead of per-document dribbles. The channel bound
//! is the backpressure: producers block while enough batches are in
//! flight.
//!
//! Failure isolation: an unreadable document or a failed embedding batch
//! is logged and reported, and the run continues. Only storage failures
//! abort the run.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{Result, WikiqaError};
use crate::extract::{extract_pages, SOURCE_KIND_PDF};
use crate::index::VectorIndex;
use crate::models::{
    Chunk, Document, IndexEntry, IngestReport, SkippedDocument, SourceDocument,
};
use crate::sources::DocumentSource;

/// Derive the stable document id for a source id.
pub fn document_id(source_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, source_id.as_bytes()).to_string()
}

/// One chunk waiting for an embedding, queued across documents.
struct EmbedJob {
    chunk_id: String,
    document_id: String,
    origin_url: Option<String>,
    text: String,
}

/// What one document task produced.
enum DocOutcome {
    Processed {
        document_id: String,
        source_id: String,
        chunks: usize,
    },
    Unchanged,
    Skipped {
        source_id: String,
        reason: String,
    },
}

/// Per-document tallies coming back from the embedding worker.
#[derive(Default)]
struct EmbedTotals {
    indexed: usize,
    skipped: usize,
    per_document: HashMap<String, (usize, usize)>,
}

impl EmbedTotals {
    fn record(&mut self, document_id: &str, indexed: usize, skipped: usize) {
        self.indexed += indexed;
        self.skipped += skipped;
        let entry = self.per_document.entry(document_id.to_string()).or_default();
        entry.0 += indexed;
        entry.1 += skipped;
    }
}

/// Run one ingestion pass over everything the source lists.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn EmbeddingClient>,
) -> Result<IngestReport> {
    let index = Arc::new(
        VectorIndex::open(pool.clone(), embedder.model_name(), embedder.dims()).await?,
    );

    let documents = source.scan().await?;
    info!(count = documents.len(), "scanned document source");

    let batch_size = config.embedding.batch_size;
    let queue_capacity = batch_size * config.embedding.max_concurrent_batches;
    let (job_tx, job_rx) = mpsc::channel::<EmbedJob>(queue_capacity.max(1));

    let worker = tokio::spawn(embedding_worker(
        job_rx,
        Arc::clone(&embedder),
        Arc::clone(&index),
        batch_size,
        config.embedding.max_concurrent_batches,
    ));

    let mut report = IngestReport {
        documents_found: documents.len(),
        ..Default::default()
    };

    // Document-level parallelism, bounded by joining before each spawn
    // once the set is full.
    let mut tasks: JoinSet<Result<DocOutcome>> = JoinSet::new();
    let mut outcomes: Vec<DocOutcome> = Vec::with_capacity(documents.len());

    for doc in documents {
        if tasks.len() >= config.source.max_concurrent_documents {
            if let Some(joined) = tasks.join_next().await {
                outcomes.push(resolve_doc_task(joined)?);
            }
        }

        let pool = pool.clone();
        let source = Arc::clone(&source);
        let config = config.clone();
        let job_tx = job_tx.clone();
        tasks.spawn(async move { process_document(&config, &pool, source, doc, job_tx).await });
    }
    // The worker's channel closes once every producer clone is gone.
    drop(job_tx);

    while let Some(joined) = tasks.join_next().await {
        outcomes.push(resolve_doc_task(joined)?);
    }

    let totals = worker
        .await
        .map_err(|e| WikiqaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    for outcome in outcomes {
        match outcome {
            DocOutcome::Processed {
                document_id,
                source_id,
                chunks,
            } => {
                let (indexed, skipped) = totals
                    .per_document
                    .get(&document_id)
                    .copied()
                    .unwrap_or((0, 0));
                if chunks > 0 && indexed == 0 && skipped == chunks {
                    // Every chunk of this document lost its embedding batch.
                    report.documents_skipped.push(SkippedDocument {
                        source_id,
                        reason: "embedding failed for all chunks".to_string(),
                    });
                } else {
                    report.documents_processed += 1;
                }
            }
            DocOutcome::Unchanged => {
                report.documents_processed += 1;
                report.documents_unchanged += 1;
            }
            DocOutcome::Skipped { source_id, reason } => {
                report
                    .documents_skipped
                    .push(SkippedDocument { source_id, reason });
            }
        }
    }

    report.chunks_indexed = totals.indexed;
    report.chunks_skipped = totals.skipped;

    info!(
        processed = report.documents_processed,
        skipped = report.documents_skipped.len(),
        chunks = report.chunks_indexed,
        "ingestion finished"
    );
    Ok(report)
}

/// Flatten a join result; a panicked document task aborts the run.
fn resolve_doc_task(
    joined: std::result::Result<Result<DocOutcome>, tokio::task::JoinError>,
) -> Result<DocOutcome> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => Err(WikiqaError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            e,
        ))),
    }
}

/// Fetch, extract, chunk, and persist one document, then queue its chunks
/// for embedding. Per-document failures come back as `Skipped`, never as
/// an `Err` that would abort the batch.
async fn process_document(
    config: &Config,
    pool: &SqlitePool,
    source: Arc<dyn DocumentSource>,
    doc: SourceDocument,
    job_tx: mpsc::Sender<EmbedJob>,
) -> Result<DocOutcome> {
    let source_id = doc.source_id.clone();

    let bytes = match source.fetch(&source_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "failed to read document");
            return Ok(DocOutcome::Skipped {
                source_id,
                reason: format!("read failed: {}", e),
            });
        }
    };

    let doc_id = document_id(&source_id);
    let dedup_hash = {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    };

    if is_unchanged(pool, &doc_id, &dedup_hash).await? {
        debug!(source_id = %source_id, "document unchanged since last run");
        return Ok(DocOutcome::Unchanged);
    }

    // PDF parsing is CPU-bound; keep it off the async workers.
    let extract_id = source_id.clone();
    let pages = match tokio::task::spawn_blocking(move || extract_pages(&extract_id, &bytes)).await
    {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            warn!(source_id = %source_id, error = %e, "skipping unreadable document");
            return Ok(DocOutcome::Skipped {
                source_id,
                reason: e.to_string(),
            });
        }
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "extraction panicked");
            return Ok(DocOutcome::Skipped {
                source_id,
                reason: format!("extraction panicked: {}", e),
            });
        }
    };

    let chunks = chunk_pages(&doc_id, &pages, &config.chunking);
    debug!(source_id = %source_id, chunks = chunks.len(), "chunked document");

    let record = Document {
        id: doc_id.clone(),
        source_id: source_id.clone(),
        title: doc.title.clone(),
        origin_url: doc.origin_url.clone(),
        source_kind: SOURCE_KIND_PDF.to_string(),
        page_count: pages.len() as i64,
        dedup_hash,
        ingested_at: chrono::Utc::now().timestamp(),
    };
    write_document(pool, &record, &chunks).await?;

    let chunk_count = chunks.len();
    for chunk in chunks {
        let job = EmbedJob {
            chunk_id: chunk.id,
            document_id: doc_id.clone(),
            origin_url: doc.origin_url.clone(),
            text: chunk.text,
        };
        // Blocks when the embedding queue is full: this is the
        // ingestion-side backpressure.
        if job_tx.send(job).await.is_err() {
            warn!(source_id = %source_id, "embedding queue closed early");
            break;
        }
    }

    Ok(DocOutcome::Processed {
        document_id: doc_id,
        source_id,
        chunks: chunk_count,
    })
}

/// True when the stored document row has the same content hash and its
/// chunks already have vectors, so the whole document can be skipped.
async fn is_unchanged(pool: &SqlitePool, doc_id: &str, dedup_hash: &str) -> Result<bool> {
    let stored: Option<String> =
        sqlx::query_scalar("SELECT dedup_hash FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(pool)
            .await?;

    if stored.as_deref() != Some(dedup_hash) {
        return Ok(false);
    }

    let vectors: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE document_id = ?")
            .bind(doc_id)
            .fetch_one(pool)
            .await?;
    Ok(vectors > 0)
}

/// Persist the document row and its chunk rows in one transaction.
/// Everything is keyed by deterministic ids, so re-ingestion overwrites.
async fn write_document(pool: &SqlitePool, doc: &Document, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, source_id, title, origin_url, source_kind, page_count, dedup_hash, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            origin_url = excluded.origin_url,
            source_kind = excluded.source_kind,
            page_count = excluded.page_count,
            dedup_hash = excluded.dedup_hash,
            ingested_at = excluded.ingested_at
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.source_id)
    .bind(&doc.title)
    .bind(&doc.origin_url)
    .bind(&doc.source_kind)
    .bind(doc.page_count)
    .bind(&doc.dedup_hash)
    .bind(doc.ingested_at)
    .execute(&mut *tx)
    .await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, text, page_start, page_end, hash)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                page_start = excluded.page_start,
                page_end = excluded.page_end,
                hash = excluded.hash
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.page_start)
        .bind(chunk.page_end)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Drain the job queue, coalescing chunks from all documents into batches
/// of `batch_size`, with at most `max_concurrent` batches embedding at
/// once. A failed batch skips exactly its own chunks.
async fn embedding_worker(
    mut rx: mpsc::Receiver<EmbedJob>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<VectorIndex>,
    batch_size: usize,
    max_concurrent: usize,
) -> Result<EmbedTotals> {
    let mut totals = EmbedTotals::default();
    let mut in_flight: JoinSet<Vec<(String, usize, usize)>> = JoinSet::new();
    let mut buffer: Vec<EmbedJob> = Vec::with_capacity(batch_size);

    while let Some(job) = rx.recv().await {
        buffer.push(job);
        if buffer.len() >= batch_size {
            if in_flight.len() >= max_concurrent.max(1) {
                if let Some(done) = in_flight.join_next().await {
                    merge_batch_result(&mut totals, done);
                }
            }
            let batch = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
            in_flight.spawn(embed_batch_task(
                batch,
                Arc::clone(&embedder),
                Arc::clone(&index),
            ));
        }
    }

    if !buffer.is_empty() {
        in_flight.spawn(embed_batch_task(buffer, Arc::clone(&embedder), Arc::clone(&index)));
    }

    while let Some(done) = in_flight.join_next().await {
        merge_batch_result(&mut totals, done);
    }

    Ok(totals)
}

fn merge_batch_result(
    totals: &mut EmbedTotals,
    joined: std::result::Result<Vec<(String, usize, usize)>, tokio::task::JoinError>,
) {
    match joined {
        Ok(per_doc) => {
            for (document_id, indexed, skipped) in per_doc {
                totals.record(&document_id, indexed, skipped);
            }
        }
        Err(e) => warn!(error = %e, "embedding batch task panicked"),
    }
}

/// Embed one batch and upsert its vectors. Returns per-document
/// (indexed, skipped) counts; never propagates an error upward since a
/// lost batch must not sink the run.
async fn embed_batch_task(
    batch: Vec<EmbedJob>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<VectorIndex>,
) -> Vec<(String, usize, usize)> {
    let texts: Vec<String> = batch.iter().map(|job| job.text.clone()).collect();
    let chunk_ids: Vec<String> = batch.iter().map(|job| job.chunk_id.clone()).collect();

    let vectors = match embedder.embed_batch(&texts).await {
        Ok(vectors) => vectors,
        Err(e) => {
            // Re-attach the chunk ids the client had no way of knowing.
            let err = match e {
                WikiqaError::EmbeddingService {
                    attempts, reason, ..
                } => WikiqaError::EmbeddingService {
                    chunk_ids: chunk_ids.clone(),
                    attempts,
                    reason,
                },
                other => other,
            };
            warn!(error = %err, "skipping chunks after embedding failure");
            return batch
                .iter()
                .map(|job| (job.document_id.clone(), 0, 1))
                .collect();
        }
    };

    let entries: Vec<IndexEntry> = batch
        .iter()
        .zip(vectors)
        .map(|(job, vector)| IndexEntry {
            chunk_id: job.chunk_id.clone(),
            document_id: job.document_id.clone(),
            origin_url: job.origin_url.clone(),
            source_kind: SOURCE_KIND_PDF.to_string(),
            vector,
        })
        .collect();

    match index.upsert(&entries).await {
        Ok(()) => batch
            .iter()
            .map(|job| (job.document_id.clone(), 1, 0))
            .collect(),
        Err(e) => {
            warn!(error = %e, "index upsert failed; skipping batch");
            batch
                .iter()
                .map(|job| (job.document_id.clone(), 0, 1))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_stable() {
        assert_eq!(document_id("a/b.pdf"), document_id("a/b.pdf"));
        assert_ne!(document_id("a/b.pdf"), document_id("a/c.pdf"));
    }
}
