//! Result assembly: text listings and the per-task output directory.
//!
//! Layout produced by [`DirectorySink`]:
//!
//! ```text
//! <output>/<task-id>/
//!     metadata.txt
//!     failed_downloads.txt   (only when something failed)
//!     papers/<title>.pdf
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::dedup::dedup_key;
use crate::download::DownloadReport;
use crate::models::{DownloadedPaper, FailedDownload, Paper, ResultLocations};

pub const METADATA_FILE: &str = "metadata.txt";
pub const FAILED_FILE: &str = "failed_downloads.txt";
pub const PAPERS_DIR: &str = "papers";

/// Final counts for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub found: usize,
    pub downloaded: usize,
    pub failed: usize,
}

pub fn summarize(report: &DownloadReport) -> Summary {
    let downloaded = report.downloaded.len();
    let failed = report.failed.len();
    Summary { found: downloaded + failed, downloaded, failed }
}

/// Numbered listing of every paper, with its download status.
pub fn render_metadata(papers: &[Paper], downloaded: &[DownloadedPaper]) -> String {
    let by_key: HashMap<String, &DownloadedPaper> =
        downloaded.iter().map(|d| (dedup_key(&d.paper), d)).collect();

    let mut out = String::new();
    let _ = writeln!(out, "Paper Search Results");
    let _ = writeln!(out, "Total papers: {}", papers.len());
    let _ = writeln!(out, "Downloaded: {}", downloaded.len());
    let _ = writeln!(out, "{}", "=".repeat(60));

    for (i, paper) in papers.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}. {}", i + 1, paper.title);
        let _ = writeln!(out, "   Authors: {}", paper.authors);
        let _ = writeln!(out, "   Journal: {}", paper.journal);
        let _ = writeln!(out, "   Year: {}", paper.year);
        let _ = writeln!(out, "   DOI: {}", if paper.has_doi() { paper.doi.as_str() } else { "N/A" });
        match by_key.get(&dedup_key(paper)) {
            Some(d) => {
                let file = d.path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
                let _ = writeln!(out, "   PDF: {PAPERS_DIR}/{file} (via {})", d.source);
            }
            None => {
                let _ = writeln!(out, "   PDF: not downloaded");
            }
        }
    }
    out
}

/// Listing of failed items with the sources that were tried.
pub fn render_failed(failed: &[FailedDownload]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Failed Downloads: {}", failed.len());
    let _ = writeln!(out, "{}", "=".repeat(60));
    for (i, f) in failed.iter().enumerate() {
        let attempted: Vec<&str> = f.attempted.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out);
        let _ = writeln!(out, "{}. {}", i + 1, f.paper.title);
        let _ = writeln!(out, "   DOI: {}", if f.paper.has_doi() { f.paper.doi.as_str() } else { "N/A" });
        let _ = writeln!(out, "   Error: {}", f.error);
        let _ = writeln!(
            out,
            "   Attempted: {}",
            if attempted.is_empty() { "none".to_string() } else { attempted.join(", ") }
        );
    }
    out
}

/// Hand-off point for finished task output.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// `failed` is `None` when every download succeeded.
    async fn store(
        &self,
        task_dir: &Path,
        metadata: &str,
        failed: Option<&str>,
        files: &[PathBuf],
    ) -> anyhow::Result<ResultLocations>;
}

/// Writes listings as plain files next to the `papers/` folder.
#[derive(Debug, Default, Clone)]
pub struct DirectorySink;

#[async_trait]
impl ArchiveSink for DirectorySink {
    async fn store(
        &self,
        task_dir: &Path,
        metadata: &str,
        failed: Option<&str>,
        files: &[PathBuf],
    ) -> anyhow::Result<ResultLocations> {
        let papers_dir = task_dir.join(PAPERS_DIR);
        tokio::fs::create_dir_all(&papers_dir).await?;

        let metadata_file = task_dir.join(METADATA_FILE);
        tokio::fs::write(&metadata_file, metadata).await?;

        let failed_file = match failed {
            Some(text) => {
                let path = task_dir.join(FAILED_FILE);
                tokio::fs::write(&path, text).await?;
                Some(path)
            }
            None => None,
        };

        tracing::debug!(dir = %task_dir.display(), files = files.len(), "Task output stored");
        Ok(ResultLocations {
            task_dir: task_dir.to_path_buf(),
            metadata_file,
            failed_file,
            papers_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use pretty_assertions::assert_eq;

    fn sample() -> (Vec<Paper>, Vec<DownloadedPaper>, Vec<FailedDownload>) {
        let a = Paper::new("Alpha", "10.1/a");
        let b = Paper::new("Beta", "");
        let downloaded = vec![DownloadedPaper {
            paper: a.clone(),
            source: SourceId::Unpaywall,
            path: PathBuf::from("/tmp/x/papers/Alpha.pdf"),
        }];
        let failed = vec![FailedDownload {
            paper: b.clone(),
            error: "All sources exhausted".into(),
            attempted: vec![SourceId::Unpaywall, SourceId::SciHub],
        }];
        (vec![a, b], downloaded, failed)
    }

    #[test]
    fn test_render_metadata_marks_downloads() {
        let (papers, downloaded, _) = sample();
        let text = render_metadata(&papers, &downloaded);
        assert!(text.contains("Total papers: 2"));
        assert!(text.contains("1. Alpha"));
        assert!(text.contains("PDF: papers/Alpha.pdf (via unpaywall)"));
        assert!(text.contains("2. Beta"));
        assert!(text.contains("DOI: N/A"));
        assert!(text.contains("PDF: not downloaded"));
    }

    #[test]
    fn test_render_failed_lists_sources() {
        let (_, _, failed) = sample();
        let text = render_failed(&failed);
        assert!(text.contains("Failed Downloads: 1"));
        assert!(text.contains("Attempted: unpaywall, scihub"));
        assert!(text.contains("Error: All sources exhausted"));
    }

    #[test]
    fn test_summarize() {
        let (_, downloaded, failed) = sample();
        let report = DownloadReport { downloaded, failed };
        assert_eq!(summarize(&report), Summary { found: 2, downloaded: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_directory_sink_skips_empty_failed_listing() {
        let dir = tempfile::tempdir().unwrap();
        let task_dir = dir.path().join("task");
        let loc = DirectorySink.store(&task_dir, "meta", None, &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&loc.metadata_file).unwrap(), "meta");
        assert!(loc.failed_file.is_none());
        assert!(!task_dir.join(FAILED_FILE).exists());
        assert!(loc.papers_dir.is_dir());

        let loc = DirectorySink.store(&task_dir, "meta", Some("failed"), &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(loc.failed_file.unwrap()).unwrap(), "failed");
    }
}
