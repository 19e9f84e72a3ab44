//! Data models shared across the acquisition pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const UNKNOWN_YEAR: &str = "Unknown Year";
pub const UNKNOWN_JOURNAL: &str = "Unknown Journal";
pub const UNKNOWN_AUTHORS: &str = "Unknown Authors";

/// A paper as returned by a metadata provider. Never mutated after search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub title: String,
    pub journal: String,
    /// Publication year, or [`UNKNOWN_YEAR`].
    pub year: String,
    pub authors: String,
    /// Canonical identifier; may be empty for records without a DOI.
    pub doi: String,
    /// Direct open-access document link, when the provider knows one.
    pub oa_url: Option<String>,
}

impl Paper {
    pub fn new(title: impl Into<String>, doi: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            journal: UNKNOWN_JOURNAL.to_string(),
            year: UNKNOWN_YEAR.to_string(),
            authors: UNKNOWN_AUTHORS.to_string(),
            doi: doi.into(),
            oa_url: None,
        }
    }

    pub fn with_oa_url(mut self, url: impl Into<String>) -> Self {
        self.oa_url = Some(url.into());
        self
    }

    pub fn has_doi(&self) -> bool {
        !self.doi.trim().is_empty()
    }
}

/// Inclusive publication-year filter. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

impl YearRange {
    pub fn new(from: Option<i32>, to: Option<i32>) -> Self {
        Self { from, to }
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// Document acquisition channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    OpenAccess,
    Unpaywall,
    #[serde(rename = "scihub")]
    SciHub,
    #[serde(rename = "libgen")]
    LibGen,
}

impl SourceId {
    /// Launch-priority order.
    pub const ALL: [SourceId; 4] = [
        SourceId::OpenAccess,
        SourceId::Unpaywall,
        SourceId::SciHub,
        SourceId::LibGen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::OpenAccess => "open_access",
            SourceId::Unpaywall  => "unpaywall",
            SourceId::SciHub     => "scihub",
            SourceId::LibGen     => "libgen",
        }
    }

    /// Parses a configured source list, dropping unknown names and repeats.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Vec<SourceId> {
        let mut out = Vec::new();
        for name in names {
            match name.as_ref().parse::<SourceId>() {
                Ok(id) if !out.contains(&id) => out.push(id),
                Ok(_) => {}
                Err(e) => tracing::warn!("{e}"),
            }
        }
        out
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "open_access" | "oa"    => Ok(SourceId::OpenAccess),
            "unpaywall"             => Ok(SourceId::Unpaywall),
            "scihub" | "sci_hub"    => Ok(SourceId::SciHub),
            "libgen" | "library_genesis" => Ok(SourceId::LibGen),
            other => anyhow::bail!("unknown download source '{other}'"),
        }
    }
}

// ── Download outcomes ─────────────────────────────────────────────────────────

/// Produced once per item by the racer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub success: bool,
    pub source: Option<SourceId>,
    pub error: Option<String>,
}

impl DownloadResult {
    pub fn won(source: SourceId) -> Self {
        Self { success: true, source: Some(source), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, source: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDownload {
    pub paper: Paper,
    pub error: String,
    pub attempted: Vec<SourceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedPaper {
    pub paper: Paper,
    pub source: SourceId,
    pub path: PathBuf,
}

/// Where a finished task's output landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLocations {
    pub task_dir: PathBuf,
    pub metadata_file: PathBuf,
    pub failed_file: Option<PathBuf>,
    pub papers_dir: PathBuf,
}

// ── DOI helpers ───────────────────────────────────────────────────────────────

/// A usable DOI starts with the `10.` directory indicator.
pub fn is_valid_doi(doi: &str) -> bool {
    doi.trim().starts_with("10.")
}

/// Strips resolver prefixes and lowercases (DOIs are case-insensitive).
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim();
    let lower = trimmed.to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    stripped.trim().to_string()
}
