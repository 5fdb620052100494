//! PDF text extraction.
//!
//! Turns a document's raw bytes into an ordered sequence of per-page text.
//! Pages with no extractable text (scans, diagrams) yield empty strings
//! rather than failing the document; only a structurally unreadable
//! container is an error, and that error is per-document — the ingestion
//! pipeline skips the document and continues the batch.

use crate::error::{Result, WikiqaError};
use crate::models::PageText;

/// The only source kind this pipeline ingests.
pub const SOURCE_KIND_PDF: &str = "pdf";

/// Extract per-page text from a PDF, in document order. Page numbers are
/// 1-based.
pub fn extract_pages(source_id: &str, bytes: &[u8]) -> Result<Vec<PageText>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
        WikiqaError::Extraction {
            source_id: source_id.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page_number: i + 1,
            text,
        })
        .collect())
}
