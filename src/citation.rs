//! Citation reconciliation.
//!
//! Maps retrieved chunks back to human-meaningful sources. A chunk whose
//! document has an origin link cites the wiki page; anything else falls
//! back to the document name. Deduplication is keyed on the link (or the
//! document id for name-only sources), not the label, and first-seen
//! order is preserved so citations follow retrieval rank.

use std::collections::HashSet;

use crate::models::{Citation, RetrievedChunk};

/// Build the deduplicated citation set for a ranked result list.
pub fn extract_citations(hits: &[RetrievedChunk]) -> Vec<Citation> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut citations = Vec::new();

    for hit in hits {
        let key = match &hit.origin_url {
            Some(url) => url.clone(),
            None => hit.document_id.clone(),
        };
        if !seen.insert(key) {
            continue;
        }
        citations.push(Citation {
            label: hit.title.clone(),
            url: hit.origin_url.clone(),
        });
    }

    citations
}

/// Split citations into the two response buckets: resolvable links and
/// document-name-only sources.
pub fn split_buckets(citations: &[Citation]) -> (Vec<String>, Vec<String>) {
    let mut links = Vec::new();
    let mut names = Vec::new();
    for citation in citations {
        match &citation.url {
            Some(url) => links.push(url.clone()),
            None => names.push(citation.label.clone()),
        }
    }
    (links, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: &str, title: &str, url: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}-chunk", doc),
            document_id: doc.to_string(),
            chunk_index: 0,
            score: 0.5,
            text: String::new(),
            title: title.to_string(),
            origin_url: url.map(str::to_string),
        }
    }

    #[test]
    fn shared_origin_link_cited_once() {
        let hits = vec![
            hit("a", "Deploy guide", Some("https://wiki/pages/1")),
            hit("a", "Deploy guide", Some("https://wiki/pages/1")),
            hit("b", "Other page", Some("https://wiki/pages/1")),
        ];
        let citations = extract_citations(&hits);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url.as_deref(), Some("https://wiki/pages/1"));
    }

    #[test]
    fn dedup_key_is_link_not_label() {
        // Same label, different links: both survive.
        let hits = vec![
            hit("a", "Runbook", Some("https://wiki/pages/1")),
            hit("b", "Runbook", Some("https://wiki/pages/2")),
        ];
        assert_eq!(extract_citations(&hits).len(), 2);
    }

    #[test]
    fn linkless_documents_dedup_by_document_id() {
        let hits = vec![
            hit("a", "upload.pdf", None),
            hit("a", "upload.pdf", None),
            hit("b", "other.pdf", None),
        ];
        let citations = extract_citations(&hits);
        assert_eq!(citations.len(), 2);
        assert!(citations.iter().all(|c| c.url.is_none()));
    }

    #[test]
    fn first_seen_order_preserved() {
        let hits = vec![
            hit("b", "Second page", Some("https://wiki/pages/2")),
            hit("a", "First page", Some("https://wiki/pages/1")),
            hit("b", "Second page", Some("https://wiki/pages/2")),
        ];
        let citations = extract_citations(&hits);
        let urls: Vec<&str> = citations.iter().filter_map(|c| c.url.as_deref()).collect();
        assert_eq!(urls, vec!["https://wiki/pages/2", "https://wiki/pages/1"]);
    }

    #[test]
    fn buckets_split_on_link_presence() {
        let citations = vec![
            Citation {
                label: "Linked page".into(),
                url: Some("https://wiki/pages/1".into()),
            },
            Citation {
                label: "upload.pdf".into(),
                url: None,
            },
        ];
        let (links, names) = split_buckets(&citations);
        assert_eq!(links, vec!["https://wiki/pages/1".to_string()]);
        assert_eq!(names, vec!["upload.pdf".to_string()]);
    }
}
