//! Per-task download driver.
//!
//! Items are processed one at a time (each item's race is itself concurrent)
//! with a fixed pause between items so the whole source set is not hammered.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{DownloadedPaper, FailedDownload, Paper};
use crate::racer::{SourceRacer, ALL_SOURCES_EXHAUSTED};
use crate::tasks::{band_progress, TaskStore, TaskUpdate};

pub const PROGRESS_DOWNLOAD_START: u8 = 90;
pub const PROGRESS_DOWNLOAD_END: u8 = 99;

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedPaper>,
    pub failed: Vec<FailedDownload>,
}

pub struct DownloadDriver {
    racer: Arc<SourceRacer>,
    store: Arc<TaskStore>,
    item_delay: Duration,
}

impl DownloadDriver {
    pub fn new(racer: Arc<SourceRacer>, store: Arc<TaskStore>, item_delay: Duration) -> Self {
        Self { racer, store, item_delay }
    }

    #[instrument(skip(self, papers, papers_dir), fields(task_id = %task_id, items = papers.len()))]
    pub async fn run(
        &self,
        task_id: Uuid,
        papers: &[Paper],
        papers_dir: &Path,
    ) -> std::io::Result<DownloadReport> {
        tokio::fs::create_dir_all(papers_dir).await?;

        let total = papers.len();
        let mut report = DownloadReport::default();

        for (i, paper) in papers.iter().enumerate() {
            self.store.update(
                task_id,
                TaskUpdate::new()
                    .progress(band_progress(PROGRESS_DOWNLOAD_START, PROGRESS_DOWNLOAD_END, i, total))
                    .stage(format!("Downloading {}/{}: {}", i + 1, total, paper.title)),
            );

            let acquisition = self.racer.acquire(paper, papers_dir).await;
            match (acquisition.path, acquisition.result.source) {
                (Some(path), Some(source)) if acquisition.result.success => {
                    report.downloaded.push(DownloadedPaper { paper: paper.clone(), source, path });
                }
                _ => {
                    let error = acquisition
                        .result
                        .error
                        .unwrap_or_else(|| ALL_SOURCES_EXHAUSTED.to_string());
                    warn!(doi = %paper.doi, %error, "Download failed");
                    report.failed.push(FailedDownload {
                        paper: paper.clone(),
                        error,
                        attempted: acquisition.attempted,
                    });
                }
            }

            self.store.update(
                task_id,
                TaskUpdate::new()
                    .downloaded(report.downloaded.len())
                    .progress(band_progress(PROGRESS_DOWNLOAD_START, PROGRESS_DOWNLOAD_END, i + 1, total)),
            );

            if i + 1 < total && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        info!(
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "Download phase finished"
        );
        Ok(report)
    }
}
