//! Library Genesis scimag scraper.
//!
//! For each mirror: `<mirror>/scimag/ads.php?doi=<doi>` lists the download
//! page; the `GET` link on it points at the file.

use std::time::Duration;

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use super::{clean_mirrors, download, resolve_link, FetchedDocument, PdfAdapter};
use crate::models::{normalize_doi, Paper, SourceId};

pub struct LibGenAdapter {
    client: SandboxClient,
    mirrors: Vec<String>,
    timeout: Duration,
}

impl LibGenAdapter {
    pub fn new(mirrors: &[String], timeout: Duration) -> anyhow::Result<Self> {
        let mirrors = clean_mirrors(mirrors);
        let mut client = SandboxClient::new()?;
        for mirror in &mirrors {
            client.allow_url_host(mirror);
        }
        Ok(Self { client, mirrors, timeout })
    }

    async fn try_mirror(&self, mirror: &str, doi: &str) -> anyhow::Result<Option<FetchedDocument>> {
        let ads_url = format!("{mirror}/scimag/ads.php");
        let resp = self.client.get(&ads_url)?.query(&[("doi", doi)]).send().await?;
        if !resp.status().is_success() {
            debug!(mirror, status = %resp.status(), "LibGen mirror refused");
            return Ok(None);
        }
        let page_url = resp.url().to_string();
        let html = resp.text().await?;

        let Some(raw) = find_get_link(&html) else {
            debug!(mirror, "No GET link on LibGen page");
            return Ok(None);
        };
        let Some(file_url) = resolve_link(&page_url, &raw) else {
            return Ok(None);
        };
        download(self.client.get_external(&file_url)?, &file_url).await
    }
}

#[async_trait]
impl PdfAdapter for LibGenAdapter {
    fn source(&self) -> SourceId {
        SourceId::LibGen
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
                    info!(mirror = %mirror, bytes = doc.bytes.len(), "LibGen delivered document");
                    return Ok(Some(doc));
                }
                Ok(None) => {}
                Err(e) => debug!(mirror = %mirror, "LibGen mirror failed: {e}"),
            }
        }
        Ok(None)
    }
}

fn find_get_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(sel) = Selector::parse("a[href*='get.php']") {
        if let Some(href) = document.select(&sel).find_map(|a| a.value().attr("href")) {
            return Some(href.trim().to_string());
        }
    }

    let anchors = Selector::parse("a[href]").ok()?;
    document
        .select(&anchors)
        .find(|a| a.text().collect::<String>().trim().eq_ignore_ascii_case("get"))
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}
