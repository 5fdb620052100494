//! The query path: validate → retrieve → cite → generate.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::citation::{extract_citations, split_buckets};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{Result, WikiqaError};
use crate::generate::{build_prompt, GenerationClient};
use crate::index::VectorIndex;
use crate::models::AskResponse;
use crate::retrieval::retrieve;

/// Returned when nothing in the index matched; the generation service is
/// not called without grounding context.
pub const NO_CONTEXT_ANSWER: &str =
    "No indexed content matched the question. Try ingesting more documents or rephrasing.";

/// Answer one question against the index. Failures are terminal for this
/// query only; nothing here mutates the index.
pub async fn run_ask(
    config: &Config,
    pool: &SqlitePool,
    embedder: &dyn EmbeddingClient,
    generator: &dyn GenerationClient,
    query: &str,
) -> Result<AskResponse> {
    // Rejected before any remote call is made.
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(WikiqaError::Validation("query must not be empty".into()));
    }

    let index = VectorIndex::open(pool.clone(), embedder.model_name(), embedder.dims()).await?;

    let hits = retrieve(
        &index,
        embedder,
        trimmed,
        config.retrieval.top_k,
        config.retrieval.per_document_cap,
        config.retrieval.candidate_k,
    )
    .await?;
    debug!(hits = hits.len(), "retrieval finished");

    if hits.is_empty() {
        return Ok(AskResponse {
            answer: NO_CONTEXT_ANSWER.to_string(),
            citation_links: Vec::new(),
            other_sources: Vec::new(),
        });
    }

    let citations = extract_citations(&hits);
    let (citation_links, other_sources) = split_buckets(&citations);

    let prompt = build_prompt(trimmed, &hits);
    let answer = generator.generate(&prompt).await?;
    info!(
        citations = citations.len(),
        model = generator.model_name(),
        "generated answer"
    );

    Ok(AskResponse {
        answer,
        citation_links,
        other_sources,
    })
}
