//! Sci-Hub scraper.
//!
//! Walks the configured mirror list; for each mirror it fetches
//! `<mirror>/<doi>`, finds the embedded PDF link and downloads it. The first
//! mirror that yields a document wins. Layouts differ between mirrors and over
//! time, so several link patterns are tried in order.

use std::time::Duration;

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use super::{clean_mirrors, download, resolve_link, FetchedDocument, PdfAdapter};
use crate::models::{normalize_doi, Paper, SourceId};

/// (selector, attribute) pairs, most specific first.
const LINK_PATTERNS: &[(&str, &str)] = &[
    ("embed[type='application/pdf']", "src"),
    ("object[type='application/pdf']", "data"),
    ("iframe#pdf", "src"),
    ("embed#pdf", "src"),
    ("#pdf", "src"),
    ("div#article a", "href"),
    ("a[href$='.pdf']", "href"),
];

pub struct SciHubAdapter {
    client: SandboxClient,
    mirrors: Vec<String>,
    timeout: Duration,
}

impl SciHubAdapter {
    pub fn new(mirrors: &[String], timeout: Duration) -> anyhow::Result<Self> {
        let mirrors = clean_mirrors(mirrors);
        let mut client = SandboxClient::new()?;
        for mirror in &mirrors {
            client.allow_url_host(mirror);
        }
        Ok(Self { client, mirrors, timeout })
    }

    async fn try_mirror(&self, mirror: &str, doi: &str) -> anyhow::Result<Option<FetchedDocument>> {
        let page_url = format!("{mirror}/{doi}");
        let resp = self.client.get(&page_url)?.send().await?;
        if !resp.status().is_success() {
            debug!(mirror, status = %resp.status(), "Sci-Hub mirror refused");
            return Ok(None);
        }

        let is_pdf = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/pdf"));
        let page_url = resp.url().to_string();
        if is_pdf {
            let bytes = resp.bytes().await?.to_vec();
            return Ok(Some(FetchedDocument {
                bytes,
                content_type: Some("application/pdf".to_string()),
                url: page_url,
            }));
        }

        let html = resp.text().await?;
        let Some(raw) = find_pdf_link(&html) else {
            debug!(mirror, "Could not find PDF link on Sci-Hub page");
            return Ok(None);
        };
        let Some(pdf_url) = resolve_link(&page_url, &raw) else {
            return Ok(None);
        };
        debug!(%pdf_url, "Found PDF URL");
        download(self.client.get_external(&pdf_url)?, &pdf_url).await
    }
}

#[async_trait]
impl PdfAdapter for SciHubAdapter {
    fn source(&self) -> SourceId {
        SourceId::SciHub
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, paper), fields(doi = %paper.doi))]
    async fn fetch(&self, paper: &Paper) -> anyhow::Result<Option<FetchedDocument>> {
        let doi = normalize_doi(&paper.doi);
        for mirror in &self.mirrors {
            match self.try_mirror(mirror, &doi).await {
                Ok(Some(doc)) => {
                    info!(mirror = %mirror, bytes = doc.bytes.len(), "Sci-Hub delivered document");
                    return Ok(Some(doc));
                }
                Ok(None) => {}
                Err(e) => debug!(mirror = %mirror, "Sci-Hub mirror failed: {e}"),
            }
        }
        Ok(None)
    }
}

/// Locates the PDF link on a Sci-Hub article page.
fn find_pdf_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for (pattern, attr) in LINK_PATTERNS {
        let Ok(selector) = Selector::parse(pattern) else { continue };
        if let Some(link) = document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty() && !v.starts_with('#') && !v.starts_with("javascript:"))
        {
            return Some(strip_fragment(link));
        }
    }

    // Download button: onclick="location.href='//host/file.pdf?download=true'"
    let Ok(button) = Selector::parse("button[onclick], a[onclick]") else { return None };
    document
        .select(&button)
        .filter_map(|el| el.value().attr("onclick"))
        .find_map(onclick_target)
}

fn onclick_target(onclick: &str) -> Option<String> {
    if !onclick.contains("location.href") {
        return None;
    }
    let start = onclick.find(['\'', '"'])?;
    let end = onclick.rfind(['\'', '"'])?;
    (start < end).then(|| onclick[start + 1..end].to_string())
}

fn strip_fragment(link: &str) -> String {
    link.split('#').next().unwrap_or(link).to_string()
}
