//! Rolling-buffer text chunker.
//!
//! Accumulates extracted page text into a buffer and emits a chunk every
//! time the buffer reaches `max_chars`. The next buffer is seeded with the
//! trailing `overlap_chars` of the emitted chunk (not the next page's
//! text), so semantic context crosses chunk boundaries. Lengths are
//! measured in characters, not bytes, so multi-byte text never splits
//! inside a code point.
//!
//! Chunk ids are deterministic (UUIDv5 of document id + ordinal): re-running
//! ingestion over an unchanged document produces identical ids, which is
//! what makes index upserts idempotent.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, PageText};

/// Derive the stable chunk id for a (document, ordinal) pair.
pub fn chunk_id(document_id: &str, chunk_index: i64) -> String {
    let name = format!("{}:{}", document_id, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Split one document's page stream into bounded, overlapping chunks.
///
/// A document shorter than `max_chars` yields exactly one chunk; an empty
/// document yields none. `overlap_chars < max_chars` is enforced at config
/// load, before this runs.
pub fn chunk_pages(document_id: &str, pages: &[PageText], cfg: &ChunkingConfig) -> Vec<Chunk> {
    let max = cfg.max_chars;
    let overlap = cfg.overlap_chars;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buf: Vec<char> = Vec::new();
    // Chars at the head of `buf` that were carried over from the previous
    // chunk; a flush that contains nothing else is not re-emitted.
    let mut seed_len: usize = 0;
    let mut page_start: i64 = 0;
    let mut index: i64 = 0;

    for page in pages {
        let page_number = page.page_number as i64;
        for ch in page.text.chars() {
            if buf.is_empty() {
                page_start = page_number;
            }
            buf.push(ch);

            if buf.len() >= max {
                let text: String = buf.iter().collect();
                chunks.push(make_chunk(
                    document_id,
                    index,
                    &text,
                    page_start,
                    page_number,
                ));
                index += 1;

                buf = buf.split_off(buf.len() - overlap);
                seed_len = buf.len();
                page_start = page_number;
            }
        }
    }

    // Flush whatever accumulated past the last boundary. A buffer holding
    // only the carried-over seed is already covered by the previous chunk.
    if buf.len() > seed_len {
        let text: String = buf.iter().collect();
        if !text.trim().is_empty() {
            let page_end = pages
                .iter()
                .rev()
                .find(|p| !p.text.is_empty())
                .map(|p| p.page_number as i64)
                .unwrap_or(page_start);
            chunks.push(make_chunk(document_id, index, &text, page_start, page_end));
        }
    }

    chunks
}

fn make_chunk(document_id: &str, index: i64, text: &str, page_start: i64, page_end: i64) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        page_start,
        page_end,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    fn one_page(text: &str) -> Vec<PageText> {
        vec![PageText {
            page_number: 1,
            text: text.to_string(),
        }]
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let chunks = chunk_pages("doc1", &one_page("hello world"), &cfg(500, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 1));
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        assert!(chunk_pages("doc1", &[], &cfg(500, 50)).is_empty());
        assert!(chunk_pages("doc1", &one_page(""), &cfg(500, 50)).is_empty());
    }

    #[test]
    fn pages_without_text_are_tolerated() {
        let pages = vec![
            PageText {
                page_number: 1,
                text: String::new(),
            },
            PageText {
                page_number: 2,
                text: "content on page two".to_string(),
            },
            PageText {
                page_number: 3,
                text: String::new(),
            },
        ];
        let chunks = chunk_pages("doc1", &pages, &cfg(500, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_start, 2);
        assert_eq!(chunks[0].page_end, 2);
    }

    #[test]
    fn consecutive_chunks_overlap_by_configured_amount() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(100, 20));
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].text.chars().rev().take(20).collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let next_head: String = pair[1].text.chars().take(20).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn chunk_count_matches_stride_formula() {
        // Each chunk past the first consumes (max - overlap) new chars, so
        // the count is ceil(len / (max - overlap)) give or take the final
        // partial chunk.
        let len = 2350usize;
        let (max, overlap) = (500usize, 50usize);
        let text: String = "abcdefghij".chars().cycle().take(len).collect();
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(max, overlap));

        let expected = (len + (max - overlap) - 1) / (max - overlap);
        let got = chunks.len();
        assert!(
            got == expected || got + 1 == expected || got == expected + 1,
            "expected about {} chunks, got {}",
            expected,
            got
        );
    }

    #[test]
    fn emitted_chunks_respect_max_chars() {
        let text: String = "0123456789".chars().cycle().take(1234).collect();
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(100, 10));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
    }

    #[test]
    fn multibyte_text_never_splits_a_code_point() {
        let text: String = "héllo wörld ünïcode ".chars().cycle().take(300).collect();
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(64, 8));
        let rejoined: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        assert!(rejoined >= 300);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 64);
        }
    }

    #[test]
    fn page_ranges_are_monotone() {
        let pages: Vec<PageText> = (1..=3)
            .map(|n| PageText {
                page_number: n,
                text: "x".repeat(220),
            })
            .collect();
        let chunks = chunk_pages("doc1", &pages, &cfg(150, 20));
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            assert!(pair[0].page_start <= pair[0].page_end);
            assert!(pair[1].page_start >= pair[0].page_start);
            assert!(pair[1].page_end >= pair[0].page_end);
        }
    }

    #[test]
    fn ids_are_deterministic_across_runs() {
        let text: String = "determinism ".chars().cycle().take(700).collect();
        let a = chunk_pages("doc1", &one_page(&text), &cfg(200, 30));
        let b = chunk_pages("doc1", &one_page(&text), &cfg(200, 30));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.hash, y.hash);
        }
        // Different documents never share chunk ids.
        let c = chunk_pages("doc2", &one_page(&text), &cfg(200, 30));
        assert_ne!(a[0].id, c[0].id);
    }

    #[test]
    fn zero_overlap_is_a_plain_partition() {
        let text: String = "abcde".chars().cycle().take(1000).collect();
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(250, 0));
        assert_eq!(chunks.len(), 4);
        let total: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn exact_boundary_does_not_emit_seed_only_tail() {
        // Document length is an exact multiple of the stride; the leftover
        // buffer holds only the overlap seed and must not become a chunk.
        let text: String = "z".repeat(100);
        let chunks = chunk_pages("doc1", &one_page(&text), &cfg(100, 10));
        assert_eq!(chunks.len(), 1);
    }
}
