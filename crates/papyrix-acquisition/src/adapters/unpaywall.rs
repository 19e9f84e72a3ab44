//! Unpaywall legal-OA lookup.
//!
//! API: https://api.unpaywall.org/v2/{doi}?email={email}
//! The lookup returns candidate locations; we try the best location first,
//! then repository copies, then publisher copies.

use std::time::Duration;

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{download, FetchedDocument, PdfAdapter};
use crate::models::{normalize_doi, Paper, SourceId};

const UNPAYWALL_API: &str = "https://api.unpaywall.org/v2";

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Clone, Deserialize)]
struct OaLocation {
    url: Option<String>,
    url_for_pdf: Option<String>,
    host_type: Option<String>, // "publisher" | "repository"
}

impl OaLocation {
    fn pdf_url(&self) -> Option<&str> {
        self.url_for_pdf.as_deref().or(self.url.as_deref())
    }
}

pub struct UnpaywallAdapter {
    client: SandboxClient,
    email: Option<String>,
    timeout: Duration,
}

impl UnpaywallAdapter {
    pub fn new(email: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: SandboxClient::new()?, email, timeout })
    }
}

#[async_trait]
impl PdfAdapter for UnpaywallAdapter {
    fn source(&self) -> SourceId {
        SourceId::Unpaywall
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, paper), fields(doi = %paper.doi))]
    async fn fetch(&self, paper: &Paper) -> anyhow::Result<Option<FetchedDocument>> {
        let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) else {
            anyhow::bail!("Unpaywall requires a contact email");
        };

        let url = format!("{}/{}", UNPAYWALL_API, normalize_doi(&paper.doi));
        let resp = self.client.get(&url)?.query(&[("email", email)]).send().await?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Unpaywall lookup failed");
            return Ok(None);
        }
        let data: UnpaywallResponse = resp.json().await?;
        if !data.is_oa {
            return Ok(None);
        }

        for candidate in candidate_urls(&data) {
            match download(self.client.get_external(&candidate)?, &candidate).await {
                Ok(Some(doc)) => return Ok(Some(doc)),
                Ok(None) => {}
                Err(e) => debug!(url = %candidate, "Unpaywall location failed: {e}"),
            }
        }
        Ok(None)
    }
}

/// Best location, then repositories, then publishers; duplicates removed.
fn candidate_urls(data: &UnpaywallResponse) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |loc: &OaLocation| {
        if let Some(u) = loc.pdf_url() {
            if !out.iter().any(|seen| seen == u) {
                out.push(u.to_string());
            }
        }
    };

    if let Some(best) = &data.best_oa_location {
        push(best);
    }
    for host in ["repository", "publisher"] {
        for loc in data.oa_locations.iter().filter(|l| l.host_type.as_deref() == Some(host)) {
            push(loc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_candidate_order() {
        let data: UnpaywallResponse = serde_json::from_value(serde_json::json!({
            "doi": "10.1/x",
            "is_oa": true,
            "best_oa_location": { "url_for_pdf": "https://pub.org/best.pdf", "host_type": "publisher" },
            "oa_locations": [
                { "url_for_pdf": "https://pub.org/best.pdf", "host_type": "publisher" },
                { "url": "https://pub.org/other", "host_type": "publisher" },
                { "url_for_pdf": "https://arxiv.org/pdf/1.pdf", "host_type": "repository" },
                { "url_for_pdf": null, "url": null, "host_type": "repository" }
            ]
        }))
        .unwrap();
        assert_eq!(
            candidate_urls(&data),
            vec![
                "https://pub.org/best.pdf",
                "https://arxiv.org/pdf/1.pdf",
                "https://pub.org/other",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_email_is_source_failure() {
        let adapter = UnpaywallAdapter::new(None, Duration::from_secs(1)).unwrap();
        assert!(adapter.fetch(&Paper::new("t", "10.1/x")).await.is_err());
    }

    #[tokio::test]
    #[ignore = "Hits external Unpaywall API"]
    async fn test_unpaywall_live() {
        let email = std::env::var("PAPYRIX_UNPAYWALL_EMAIL").unwrap();
        let adapter = UnpaywallAdapter::new(Some(email), Duration::from_secs(20)).unwrap();
        let doc = adapter.fetch(&Paper::new("Deep learning", "10.1038/nature14539")).await.unwrap();
        assert!(doc.is_some());
    }
}
