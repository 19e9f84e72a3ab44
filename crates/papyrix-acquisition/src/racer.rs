//! Concurrent multi-source racer.
//!
//! Every applicable adapter is launched at once, each under its own timeout.
//! The winner is the first validated success *by launch order*: a success from
//! adapter `k` is accepted as soon as adapters `0..k` have all settled as
//! failures, and the remaining in-flight attempts are dropped (which cancels
//! their requests). This selects the same source a wait-for-all scan would
//! pick while returning as early as possible.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::adapters::{FetchedDocument, PdfAdapter};
use crate::models::{DownloadResult, Paper, SourceId};
use crate::validate::validate;

pub const ALL_SOURCES_EXHAUSTED: &str = "All sources exhausted";
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;
const MAX_FILENAME_LEN: usize = 100;

/// Outcome of racing one paper.
#[derive(Debug)]
pub struct RaceOutcome {
    pub result: DownloadResult,
    pub document: Option<FetchedDocument>,
    pub attempted: Vec<SourceId>,
}

/// Outcome of racing one paper and persisting the winner.
#[derive(Debug)]
pub struct Acquisition {
    pub result: DownloadResult,
    pub path: Option<PathBuf>,
    pub attempted: Vec<SourceId>,
}

enum Slot {
    Pending,
    Failed,
    Won(FetchedDocument),
}

pub struct SourceRacer {
    adapters: Vec<Arc<dyn PdfAdapter>>,
    max_bytes: usize,
}

impl SourceRacer {
    /// Keeps the adapters whose source is enabled, ordered by `enabled`.
    pub fn new(adapters: Vec<Arc<dyn PdfAdapter>>, enabled: &[SourceId]) -> Self {
        let mut ordered = Vec::new();
        for source in enabled {
            match adapters.iter().find(|a| a.source() == *source) {
                Some(adapter) => ordered.push(Arc::clone(adapter)),
                None => warn!(source = source.as_str(), "Enabled source has no adapter"),
            }
        }
        Self { adapters: ordered, max_bytes: DEFAULT_MAX_BYTES }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    pub async fn race(&self, paper: &Paper) -> RaceOutcome {
        let candidates: Vec<Arc<dyn PdfAdapter>> = self
            .adapters
            .iter()
            .filter(|a| a.applies_to(paper))
            .cloned()
            .collect();
        let attempted: Vec<SourceId> = candidates.iter().map(|a| a.source()).collect();

        let mut in_flight: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(idx, adapter)| {
                let adapter = Arc::clone(adapter);
                async move { (idx, self.attempt(&*adapter, paper).await) }
            })
            .collect();

        let mut slots: Vec<Slot> = candidates.iter().map(|_| Slot::Pending).collect();

        while let Some((idx, outcome)) = in_flight.next().await {
            slots[idx] = match outcome {
                Some(doc) => Slot::Won(doc),
                None => Slot::Failed,
            };
            if let Some((winner, doc)) = settled_winner(&mut slots) {
                let source = attempted[winner];
                info!(doi = %paper.doi, source = source.as_str(), "Source won race");
                return RaceOutcome {
                    result: DownloadResult::won(source),
                    document: Some(doc),
                    attempted,
                };
            }
        }

        debug!(doi = %paper.doi, ?attempted, "All sources exhausted");
        RaceOutcome {
            result: DownloadResult::failed(ALL_SOURCES_EXHAUSTED),
            document: None,
            attempted,
        }
    }

    /// Races the paper and writes the winning document into `papers_dir`.
    pub async fn acquire(&self, paper: &Paper, papers_dir: &Path) -> Acquisition {
        let outcome = self.race(paper).await;
        let (Some(doc), Some(source)) = (outcome.document, outcome.result.source) else {
            return Acquisition { result: outcome.result, path: None, attempted: outcome.attempted };
        };

        let path = unique_path(papers_dir, &safe_filename(&paper.title));
        match tokio::fs::write(&path, &doc.bytes).await {
            Ok(()) => Acquisition {
                result: DownloadResult::won(source),
                path: Some(path),
                attempted: outcome.attempted,
            },
            Err(e) => {
                warn!(path = %path.display(), "Failed to save document: {e}");
                Acquisition {
                    result: DownloadResult::failed(format!("Failed to save file: {e}")),
                    path: None,
                    attempted: outcome.attempted,
                }
            }
        }
    }

    /// One adapter call; every failure mode collapses to `None`.
    async fn attempt(&self, adapter: &dyn PdfAdapter, paper: &Paper) -> Option<FetchedDocument> {
        let source = adapter.source().as_str();
        match tokio::time::timeout(adapter.timeout(), adapter.fetch(paper)).await {
            Ok(Ok(Some(doc))) => match validate(&doc, self.max_bytes) {
                Ok(()) => Some(doc),
                Err(rejection) => {
                    debug!(source, url = %doc.url, "Rejected document: {rejection}");
                    None
                }
            },
            Ok(Ok(None)) => {
                debug!(source, "No copy available");
                None
            }
            Ok(Err(e)) => {
                debug!(source, "Source failed: {e:#}");
                None
            }
            Err(_) => {
                debug!(source, timeout = ?adapter.timeout(), "Source timed out");
                None
            }
        }
    }
}

/// Takes the lowest-index success once every earlier slot has failed.
fn settled_winner(slots: &mut [Slot]) -> Option<(usize, FetchedDocument)> {
    for (idx, slot) in slots.iter_mut().enumerate() {
        match slot {
            Slot::Pending => return None,
            Slot::Failed => continue,
            Slot::Won(_) => {
                if let Slot::Won(doc) = std::mem::replace(slot, Slot::Failed) {
                    return Some((idx, doc));
                }
            }
        }
    }
    None
}

/// Filesystem-safe `.pdf` name derived from a title.
pub fn safe_filename(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut last_underscore = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
            last_underscore = false;
        } else if !last_underscore {
            name.push('_');
            last_underscore = true;
        }
    }
    let trimmed: String = name.trim_matches('_').chars().take(MAX_FILENAME_LEN).collect();
    let stem = trimmed.trim_end_matches('_');
    if stem.is_empty() {
        "untitled.pdf".to_string()
    } else {
        format!("{stem}.pdf")
    }
}

/// `dir/name`, or `dir/stem_2.pdf`, `dir/stem_3.pdf`... when taken.
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name.strip_suffix(".pdf").unwrap_or(file_name);
    (2..)
        .map(|n| dir.join(format!("{stem}_{n}.pdf")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("Deep learning: a review (2015)"), "Deep_learning_a_review_2015.pdf");
        assert_eq!(safe_filename("  ***  "), "untitled.pdf");
        assert_eq!(safe_filename("Ünïcode – title"), "n_code_title.pdf");
        let long = "a".repeat(300);
        assert_eq!(safe_filename(&long), format!("{}.pdf", "a".repeat(100)));
    }

    #[test]
    fn test_unique_path_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "x.pdf");
        assert_eq!(first, dir.path().join("x.pdf"));
        std::fs::write(&first, b"%PDF").unwrap();
        let second = unique_path(dir.path(), "x.pdf");
        assert_eq!(second, dir.path().join("x_2.pdf"));
        std::fs::write(&second, b"%PDF").unwrap();
        assert_eq!(unique_path(dir.path(), "x.pdf"), dir.path().join("x_3.pdf"));
    }

    #[test]
    fn test_settled_winner_waits_for_earlier_slots() {
        let doc = || FetchedDocument { bytes: b"%PDF".to_vec(), content_type: None, url: String::new() };
        let mut slots = vec![Slot::Pending, Slot::Won(doc())];
        assert!(settled_winner(&mut slots).is_none());
        slots[0] = Slot::Failed;
        assert_eq!(settled_winner(&mut slots).map(|(i, _)| i), Some(1));

        let mut slots = vec![Slot::Won(doc()), Slot::Pending];
        assert_eq!(settled_winner(&mut slots).map(|(i, _)| i), Some(0));
    }
}
