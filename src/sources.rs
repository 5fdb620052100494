//! Document-source providers.
//!
//! A [`DocumentSource`] lists the documents available for ingestion and
//! fetches their raw bytes. How the documents got there (wiki export jobs,
//! manual uploads) is someone else's problem; this boundary only reads.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::error::{Result, WikiqaError};
use crate::models::SourceDocument;

/// A provider of raw documents for the ingestion pipeline.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List available documents in a deterministic order.
    async fn scan(&self) -> Result<Vec<SourceDocument>>;

    /// Fetch one document's raw bytes by its source id.
    async fn fetch(&self, source_id: &str) -> Result<Vec<u8>>;
}

/// Optional manifest mapping exported files to their originating wiki pages.
///
/// ```toml
/// [links]
/// "runbooks/deploy.pdf" = "https://wiki.example.com/pages/4711"
/// ```
#[derive(Debug, Deserialize, Default)]
struct LinksManifest {
    #[serde(default)]
    links: HashMap<String, String>,
}

const LINKS_MANIFEST: &str = "links.toml";

/// Reads PDF exports from a local directory tree.
#[derive(Debug)]
pub struct FilesystemSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    origin_links: HashMap<String, String>,
}

impl FilesystemSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        if !config.root.exists() {
            return Err(WikiqaError::Config(format!(
                "source root does not exist: {}",
                config.root.display()
            )));
        }

        let include = build_globset(&config.include_globs)?;
        let exclude = build_globset(&config.exclude_globs)?;

        let origin_links = load_links_manifest(&config.root)?;

        Ok(Self {
            root: config.root.clone(),
            include,
            exclude,
            follow_symlinks: config.follow_symlinks,
            origin_links,
        })
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    async fn scan(&self) -> Result<Vec<SourceDocument>> {
        let mut documents = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|e| {
                WikiqaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let source_id = relative.to_string_lossy().to_string();

            if self.exclude.is_match(&source_id) || !self.include.is_match(&source_id) {
                continue;
            }

            let title = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| source_id.clone());

            documents.push(SourceDocument {
                origin_url: self.origin_links.get(&source_id).cloned(),
                source_id,
                title,
            });
        }

        documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(documents)
    }

    async fn fetch(&self, source_id: &str) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(self.root.join(source_id)).await?;
        Ok(bytes)
    }
}

fn load_links_manifest(root: &std::path::Path) -> Result<HashMap<String, String>> {
    let path = root.join(LINKS_MANIFEST);
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(&path)?;
    let manifest: LinksManifest = toml::from_str(&content).map_err(|e| {
        WikiqaError::Config(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(manifest.links)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| WikiqaError::Config(format!("bad glob '{}': {}", pattern, e)))?,
        );
    }
    builder
        .build()
        .map_err(|e| WikiqaError::Config(format!("bad glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    fn source_config(root: &std::path::Path) -> SourceConfig {
        SourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.pdf".to_string()],
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
            max_concurrent_documents: 2,
        }
    }

    #[tokio::test]
    async fn scan_lists_matching_files_in_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        std::fs::write(tmp.path().join("beta.pdf"), b"b").unwrap();
        std::fs::write(tmp.path().join("alpha.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"n").unwrap();
        std::fs::write(tmp.path().join("drafts/wip.pdf"), b"w").unwrap();

        let source = FilesystemSource::new(&source_config(tmp.path())).unwrap();
        let docs = source.scan().await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha.pdf", "beta.pdf"]);
    }

    #[tokio::test]
    async fn links_manifest_attaches_origin_urls() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("page.pdf"), b"p").unwrap();
        std::fs::write(tmp.path().join("orphan.pdf"), b"o").unwrap();
        std::fs::write(
            tmp.path().join("links.toml"),
            "[links]\n\"page.pdf\" = \"https://wiki.example.com/pages/42\"\n",
        )
        .unwrap();

        let source = FilesystemSource::new(&source_config(tmp.path())).unwrap();
        let docs = source.scan().await.unwrap();

        let page = docs.iter().find(|d| d.source_id == "page.pdf").unwrap();
        assert_eq!(
            page.origin_url.as_deref(),
            Some("https://wiki.example.com/pages/42")
        );
        let orphan = docs.iter().find(|d| d.source_id == "orphan.pdf").unwrap();
        assert!(orphan.origin_url.is_none());
    }

    #[tokio::test]
    async fn fetch_returns_raw_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("doc.pdf"), b"raw bytes").unwrap();

        let source = FilesystemSource::new(&source_config(tmp.path())).unwrap();
        let bytes = source.fetch("doc.pdf").await.unwrap();
        assert_eq!(bytes, b"raw bytes");
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let config = source_config(std::path::Path::new("/definitely/not/here"));
        assert!(matches!(
            FilesystemSource::new(&config).unwrap_err(),
            WikiqaError::Config(_)
        ));
    }
}
