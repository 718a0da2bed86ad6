//! Paper catalog access.
//!
//! The catalog itself is owned externally (an ingestion job keeps it
//! current); this module only captures the query shape the assistant needs:
//! all papers for a batch date, sorted by community upvotes.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub upvotes: u32,
}

/// Errors from the paper catalog.
#[derive(Debug, Error)]
pub enum PaperSourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog file {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Read access to the paper catalog.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// All papers for a batch date (`YYYY-MM-DD`), sorted by upvotes
    /// descending. Empty when the date has no papers.
    async fn papers_for_date(&self, date: &str) -> Result<Vec<Paper>, PaperSourceError>;
}

/// In-memory catalog, used by tests and as an override for evaluation runs.
#[derive(Default)]
pub struct MemoryPaperSource {
    by_date: HashMap<String, Vec<Paper>>,
}

impl MemoryPaperSource {
    pub fn new(by_date: HashMap<String, Vec<Paper>>) -> Self {
        Self { by_date }
    }

    pub fn insert(&mut self, date: impl Into<String>, papers: Vec<Paper>) {
        self.by_date.insert(date.into(), papers);
    }
}

#[async_trait]
impl PaperSource for MemoryPaperSource {
    async fn papers_for_date(&self, date: &str) -> Result<Vec<Paper>, PaperSourceError> {
        let mut papers = self.by_date.get(date).cloned().unwrap_or_default();
        papers.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        Ok(papers)
    }
}

/// File-backed catalog: one JSON array of papers per date.
///
/// ```text
/// {papers_dir}/
///   2026-08-06.json
///   2026-08-05.json
/// ```
#[derive(Debug, Clone)]
pub struct FilePaperSource {
    papers_dir: PathBuf,
}

impl FilePaperSource {
    pub fn new(papers_dir: impl Into<PathBuf>) -> Self {
        Self {
            papers_dir: papers_dir.into(),
        }
    }
}

#[async_trait]
impl PaperSource for FilePaperSource {
    async fn papers_for_date(&self, date: &str) -> Result<Vec<Paper>, PaperSourceError> {
        let path = self.papers_dir.join(format!("{date}.json"));

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PaperSourceError::Io {
                    path,
                    source: e,
                });
            }
        };

        let mut papers: Vec<Paper> =
            serde_json::from_str(&contents).map_err(|e| PaperSourceError::Malformed {
                path,
                message: e.to_string(),
            })?;
        papers.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paper(id: &str, upvotes: u32) -> Paper {
        Paper {
            id: id.to_string(),
            title: format!("Paper {id}"),
            summary: "A summary.".to_string(),
            authors: vec!["A. Author".to_string()],
            upvotes,
        }
    }

    #[tokio::test]
    async fn memory_source_sorts_by_upvotes() {
        let mut source = MemoryPaperSource::default();
        source.insert("2026-08-06", vec![paper("low", 2), paper("high", 90)]);

        let papers = source.papers_for_date("2026-08-06").await.unwrap();
        let ids: Vec<_> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn missing_date_is_empty() {
        let source = MemoryPaperSource::default();
        assert!(source.papers_for_date("2026-01-01").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_source_reads_date_file() {
        let temp_dir = TempDir::new().unwrap();
        let papers = vec![paper("p1", 5), paper("p2", 50)];
        tokio::fs::write(
            temp_dir.path().join("2026-08-06.json"),
            serde_json::to_string(&papers).unwrap(),
        )
        .await
        .unwrap();

        let source = FilePaperSource::new(temp_dir.path());
        let loaded = source.papers_for_date("2026-08-06").await.unwrap();
        assert_eq!(loaded[0].id, "p2");
        assert!(source.papers_for_date("2026-08-05").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_source_rejects_malformed_catalog() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(temp_dir.path().join("2026-08-06.json"), "not json")
            .await
            .unwrap();

        let source = FilePaperSource::new(temp_dir.path());
        assert!(matches!(
            source.papers_for_date("2026-08-06").await,
            Err(PaperSourceError::Malformed { .. })
        ));
    }
}
