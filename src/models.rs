//! Core data models used throughout wikiqa.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipelines.

use serde::Serialize;

/// A document listed by a [`DocumentSource`](crate::sources::DocumentSource)
/// before its bytes are fetched.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable identifier within the source (relative file path).
    pub source_id: String,
    /// Display name (file name).
    pub title: String,
    /// Originating wiki page URL, when the source knows it.
    pub origin_url: Option<String>,
}

/// Normalized document stored in SQLite. Overwritten by id on re-ingestion,
/// never mutated in place.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub origin_url: Option<String>,
    pub source_kind: String,
    pub page_count: i64,
    pub dedup_hash: String,
    pub ingested_at: i64,
}

/// One page of extracted text, in document order. Pages with no extractable
/// text carry an empty string.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

/// A bounded slice of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id derived from the document id and ordinal, so
    /// re-ingestion overwrites rather than accumulates.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// First and last page contributing text to this chunk.
    pub page_start: i64,
    pub page_end: i64,
    pub hash: String,
}

/// A row handed to [`VectorIndex::upsert`](crate::index::VectorIndex::upsert).
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub origin_url: Option<String>,
    pub source_kind: String,
    pub vector: Vec<f32>,
}

/// A retrieval hit, transient per query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub score: f32,
    pub text: String,
    pub title: String,
    pub origin_url: Option<String>,
}

/// A reference back to the original source supporting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Human-readable label (wiki page or document name).
    pub label: String,
    /// Resolvable external link, when the source document has one.
    pub url: Option<String>,
}

/// Response of the query path.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    /// Model answer, returned unmodified.
    pub answer: String,
    /// Deduplicated wiki page links, first-seen order.
    pub citation_links: Vec<String>,
    /// Document names for sources without a resolvable link.
    pub other_sources: Vec<String>,
}

/// Why a document was skipped during ingestion.
#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub source_id: String,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents_found: usize,
    pub documents_processed: usize,
    /// Documents whose bytes were identical to the last run; nothing was
    /// re-extracted or re-embedded for them.
    pub documents_unchanged: usize,
    pub documents_skipped: Vec<SkippedDocument>,
    pub chunks_indexed: usize,
    /// Chunks dropped because their embedding batch failed after retries.
    pub chunks_skipped: usize,
}
