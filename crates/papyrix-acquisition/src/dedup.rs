//! Per-task deduplication of search results.
//!
//! Papers are keyed by normalized DOI; records without a DOI fall back to a
//! whitespace-collapsed, lowercased title so they still dedup against each other.

use std::collections::HashSet;

use crate::models::{normalize_doi, Paper};

/// Result of a deduplication check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupResult {
    /// Paper is new and has been recorded.
    New,
    /// Paper duplicates an already-recorded key.
    DuplicateDoi(String),
}

impl DedupResult {
    pub fn is_new(&self) -> bool {
        matches!(self, DedupResult::New)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    seen: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the paper's key, reporting whether it was already present.
    pub fn insert(&mut self, paper: &Paper) -> DedupResult {
        let key = dedup_key(paper);
        if self.seen.insert(key.clone()) {
            DedupResult::New
        } else {
            DedupResult::DuplicateDoi(key)
        }
    }

    pub fn contains(&self, paper: &Paper) -> bool {
        self.seen.contains(&dedup_key(paper))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Canonical dedup key for a paper.
pub fn dedup_key(paper: &Paper) -> String {
    if paper.has_doi() {
        normalize_doi(&paper.doi)
    } else {
        let title = paper
            .title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        format!("title:{title}")
    }
}
