//! Error taxonomy for the wikiqa pipeline.
//!
//! Every failure class the pipeline can produce is a variant here, so
//! callers can distinguish a fatal misconfiguration from a skippable
//! per-document failure without string matching.

use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum WikiqaError {
    /// Invalid configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A document could not be read as a structurally valid container.
    /// Skip the document, continue the batch.
    #[error("unreadable document '{source_id}': {reason}")]
    Extraction { source_id: String, reason: String },

    /// The remote embedding service failed after all retries. Carries the
    /// chunk ids of the failed batch so the caller can skip and report them.
    #[error("embedding service failed for {} chunk(s) after {attempts} attempt(s): {reason}", chunk_ids.len())]
    EmbeddingService {
        chunk_ids: Vec<String>,
        attempts: u32,
        reason: String,
    },

    /// Vector length does not match the index dimensionality. The offending
    /// upsert batch is aborted; existing entries are untouched.
    #[error("vector dimensionality mismatch: index holds {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The remote generative model failed. Terminal for the query.
    #[error("generation service failed: {0}")]
    GenerationService(String),

    /// Rejected input (e.g. an empty query). No remote call was made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Filesystem failure while scanning or reading documents.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WikiqaError>;

impl WikiqaError {
    /// True for failures that are isolated to one document or chunk batch
    /// during ingestion and must not abort the whole run.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            WikiqaError::Extraction { .. } | WikiqaError::EmbeddingService { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_error_reports_chunk_count() {
        let err = WikiqaError::EmbeddingService {
            chunk_ids: vec!["a".into(), "b".into(), "c".into()],
            attempts: 4,
            reason: "429 Too Many Requests".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 chunk(s)"));
        assert!(msg.contains("4 attempt(s)"));
    }

    #[test]
    fn skippable_classification() {
        assert!(WikiqaError::Extraction {
            source_id: "x.pdf".into(),
            reason: "corrupt xref".into()
        }
        .is_skippable());
        assert!(!WikiqaError::Validation("empty query".into()).is_skippable());
        assert!(!WikiqaError::Dimension {
            expected: 1536,
            actual: 384
        }
        .is_skippable());
    }
}
