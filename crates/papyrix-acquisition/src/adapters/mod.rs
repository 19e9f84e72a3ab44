//! Extraction adapters, one per document acquisition source.
//!
//! Each adapter owns its site-specific knowledge and its own mirror loop; the
//! racer only sees `fetch(paper) -> document | none` plus a timeout budget.

pub mod libgen;
pub mod open_access;
pub mod scihub;
pub mod unpaywall;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use papyrix_common::config::DownloadConfig;
use tracing::debug;

use crate::models::{Paper, SourceId};
use crate::validate::is_valid_pdf;

/// Raw document as returned by a source, before validation.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub url: String,
}

/// Common interface for all acquisition sources.
#[async_trait]
pub trait PdfAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Wall-clock budget for one `fetch`, mirrors included.
    fn timeout(&self) -> Duration;

    /// Whether this adapter can try the paper at all. DOI-keyed by default.
    fn applies_to(&self, paper: &Paper) -> bool {
        paper.has_doi()
    }

    /// `Ok(None)` means the source has no copy; `Err` means it broke trying.
    async fn fetch(&self, paper: &Paper) -> anyhow::Result<Option<FetchedDocument>>;
}

/// Builds adapters for every enabled source, in launch order.
pub fn build_adapters(
    cfg: &DownloadConfig,
    contact_email: Option<String>,
) -> anyhow::Result<Vec<Arc<dyn PdfAdapter>>> {
    let short = Duration::from_secs(cfg.short_timeout_secs);
    let long = Duration::from_secs(cfg.long_timeout_secs);

    let mut adapters: Vec<Arc<dyn PdfAdapter>> = Vec::new();
    for source in SourceId::parse_list(&cfg.enabled_sources) {
        let adapter: Arc<dyn PdfAdapter> = match source {
            SourceId::OpenAccess => Arc::new(open_access::OpenAccessAdapter::new(short)?),
            SourceId::Unpaywall => {
                Arc::new(unpaywall::UnpaywallAdapter::new(contact_email.clone(), short)?)
            }
            SourceId::SciHub => Arc::new(scihub::SciHubAdapter::new(&cfg.scihub_mirrors, long)?),
            SourceId::LibGen => Arc::new(libgen::LibGenAdapter::new(&cfg.libgen_mirrors, long)?),
        };
        adapters.push(adapter);
    }
    Ok(adapters)
}

/// Sends a document request. Non-success statuses and bodies that are not a
/// PDF (captcha and landing pages) are "no copy", so mirror and candidate
/// loops move on to their next option.
pub(crate) async fn download(
    req: reqwest::RequestBuilder,
    url: &str,
) -> anyhow::Result<Option<FetchedDocument>> {
    let resp = req.send().await?;
    if !resp.status().is_success() {
        debug!(url, status = %resp.status(), "Document request failed");
        return Ok(None);
    }
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let final_url = resp.url().to_string();
    let bytes = resp.bytes().await?.to_vec();
    if bytes.is_empty() || !is_valid_pdf(content_type.as_deref(), &bytes) {
        debug!(url, content_type = ?content_type, "Response is not a PDF");
        return Ok(None);
    }
    Ok(Some(FetchedDocument { bytes, content_type, url: final_url }))
}

/// Resolves a scraped link against the page it came from.
/// Handles protocol-relative (`//host/x.pdf`), root-relative and relative forms.
pub(crate) fn resolve_link(base: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    let base = url::Url::parse(base).ok()?;
    base.join(raw).ok().map(|u| u.to_string())
}

/// Normalized mirror base URLs without trailing slashes.
pub(crate) fn clean_mirrors(mirrors: &[String]) -> Vec<String> {
    mirrors
        .iter()
        .map(|m| m.trim().trim_end_matches('/').to_string())
        .filter(|m| !m.is_empty())
        .collect()
}
