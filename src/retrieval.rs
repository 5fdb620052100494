//! Query-time retrieval.
//!
//! Embeds the query, over-fetches candidates from the vector index, then
//! applies a per-document cap so one long document cannot crowd every slot
//! of the context window, and truncates to the requested `k`.

use tracing::debug;

use crate::embedding::EmbeddingClient;
use crate::error::{Result, WikiqaError};
use crate::index::VectorIndex;
use crate::models::RetrievedChunk;

/// Retrieve the top `k` chunks for a query.
///
/// The index is asked for `candidate_k >= k` hits before capping, so
/// dropping same-document duplicates still leaves enough candidates to
/// fill the result. Ordering is similarity-descending with stable ties,
/// inherited from [`VectorIndex::query`].
pub async fn retrieve(
    index: &VectorIndex,
    embedder: &dyn EmbeddingClient,
    query: &str,
    k: usize,
    per_document_cap: usize,
    candidate_k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(WikiqaError::Validation("query must not be empty".into()));
    }

    let query_vector = embedder.embed_query(trimmed).await?;
    let candidates = index.query(&query_vector, candidate_k.max(k)).await?;
    debug!(candidates = candidates.len(), "fetched retrieval candidates");

    Ok(apply_document_cap(candidates, per_document_cap, k))
}

/// Keep at most `cap` chunks per document, preserving order, then truncate
/// to `k`.
fn apply_document_cap(
    candidates: Vec<RetrievedChunk>,
    cap: usize,
    k: usize,
) -> Vec<RetrievedChunk> {
    let mut per_document: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();
    let mut kept = Vec::with_capacity(k);

    for hit in candidates {
        let seen = per_document.entry(hit.document_id.clone()).or_insert(0);
        if *seen >= cap {
            continue;
        }
        *seen += 1;
        kept.push(hit);
        if kept.len() >= k {
            break;
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: &str, chunk_index: i64, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}:{}", doc, chunk_index),
            document_id: doc.to_string(),
            chunk_index,
            score,
            text: String::new(),
            title: doc.to_string(),
            origin_url: None,
        }
    }

    #[test]
    fn cap_limits_chunks_per_document() {
        let candidates = vec![
            hit("a", 0, 0.9),
            hit("a", 1, 0.8),
            hit("a", 2, 0.7),
            hit("b", 0, 0.6),
            hit("b", 1, 0.5),
        ];
        let kept = apply_document_cap(candidates, 2, 10);
        let from_a = kept.iter().filter(|h| h.document_id == "a").count();
        assert_eq!(from_a, 2);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn result_never_exceeds_k() {
        let candidates: Vec<RetrievedChunk> =
            (0..20).map(|i| hit(&format!("d{}", i), 0, 1.0 - i as f32 * 0.01)).collect();
        let kept = apply_document_cap(candidates, 3, 5);
        assert_eq!(kept.len(), 5);
    }

    #[test]
    fn capping_backfills_from_lower_ranked_documents() {
        let candidates = vec![
            hit("a", 0, 0.9),
            hit("a", 1, 0.8),
            hit("a", 2, 0.7),
            hit("b", 0, 0.1),
        ];
        let kept = apply_document_cap(candidates, 1, 2);
        let docs: Vec<&str> = kept.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(docs, vec!["a", "b"]);
    }

    #[test]
    fn order_is_preserved() {
        let candidates = vec![hit("a", 0, 0.9), hit("b", 0, 0.8), hit("c", 0, 0.7)];
        let kept = apply_document_cap(candidates, 1, 3);
        let scores: Vec<f32> = kept.iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn empty_candidates_yield_empty_result() {
        assert!(apply_document_cap(Vec::new(), 2, 5).is_empty());
    }
}
