//! CrossRef works client.
//!
//! Used for two purposes:
//! 1. Free-text search when `[providers] metadata = "crossref"`
//! 2. Resolving bare DOIs to full metadata (title, authors, journal, year)
//!
//! API: https://api.crossref.org/works/{doi}
//! Polite pool: User-Agent and `mailto` carry the contact address.

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient as Client;
use tracing::{debug, instrument};

use super::{join_authors, MetadataSource};
use crate::models::{normalize_doi, Paper, YearRange, UNKNOWN_JOURNAL, UNKNOWN_YEAR};

const CR_WORKS_URL: &str = "https://api.crossref.org/works";
const CR_MAX_ROWS: usize = 1000;

pub struct CrossRefClient {
    client: Client,
    mailto: Option<String>,
}

impl CrossRefClient {
    pub fn new(mailto: Option<String>) -> anyhow::Result<Self> {
        let ua = match &mailto {
            Some(m) => format!("Papyrix/0.1 (mailto:{m})"),
            None => "Papyrix/0.1".to_string(),
        };
        Ok(Self { client: Client::with_user_agent(&ua)?, mailto })
    }
}

#[async_trait]
impl MetadataSource for CrossRefClient {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        year_range: Option<YearRange>,
        limit: usize,
    ) -> anyhow::Result<Vec<Paper>> {
        let mut params = vec![
            ("query", query.trim().to_string()),
            ("rows", limit.clamp(1, CR_MAX_ROWS).to_string()),
            ("select", "DOI,title,author,container-title,published,link".to_string()),
        ];
        if let Some(filter) = year_range.and_then(|r| date_filter(&r)) {
            params.push(("filter", filter));
        }
        if let Some(m) = &self.mailto {
            params.push(("mailto", m.clone()));
        }

        let resp = self.client.get(CR_WORKS_URL)?.query(&params).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("CrossRef search returned status {}", resp.status());
        }
        let body: serde_json::Value = resp.json().await?;
        let papers: Vec<Paper> = body["message"]["items"]
            .as_array()
            .map(|items| items.iter().filter_map(work_to_paper).collect())
            .unwrap_or_default();
        debug!(n = papers.len(), "CrossRef search results");
        Ok(papers)
    }

    #[instrument(skip(self))]
    async fn lookup(&self, doi: &str) -> anyhow::Result<Option<Paper>> {
        let url = format!("{}/{}", CR_WORKS_URL, normalize_doi(doi));
        let resp = self.client.get(&url)?.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("CrossRef lookup returned status {}", resp.status());
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(work_to_paper(&body["message"]))
    }

    fn name(&self) -> &'static str {
        "crossref"
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn date_filter(range: &YearRange) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(from) = range.from {
        parts.push(format!("from-pub-date:{from}"));
    }
    if let Some(to) = range.to {
        parts.push(format!("until-pub-date:{to}"));
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

fn work_to_paper(work: &serde_json::Value) -> Option<Paper> {
    let title = work["title"]
        .as_array()
        .and_then(|t| t.first())
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let doi = work["DOI"].as_str().map(normalize_doi).unwrap_or_default();

    let authors = join_authors(
        work["author"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|a| {
                        let given  = a["given"].as_str().unwrap_or("").trim();
                        let family = a["family"].as_str().unwrap_or("").trim();
                        if given.is_empty() { family.to_string() } else { format!("{given} {family}") }
                    })
                    .collect()
            })
            .unwrap_or_default(),
    );

    let journal = work["container-title"]
        .as_array()
        .and_then(|j| j.first())
        .and_then(|j| j.as_str())
        .unwrap_or(UNKNOWN_JOURNAL)
        .to_string();

    let year = work["published"]["date-parts"]
        .as_array()
        .and_then(|dp| dp.first())
        .and_then(|dp| dp.as_array())
        .and_then(|parts| parts.first())
        .and_then(|y| y.as_u64())
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    let oa_url = work["link"].as_array().and_then(|links| {
        links
            .iter()
            .find(|l| l["content-type"].as_str() == Some("application/pdf"))
            .and_then(|l| l["URL"].as_str())
            .map(String::from)
    });

    Some(Paper { title, journal, year, authors, doi, oa_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_work_to_paper_minimal() {
        let work = serde_json::json!({
            "DOI": "10.1000/Test",
            "title": ["Test Paper Title"],
            "author": [{ "given": "Jane", "family": "Doe" }, { "family": "Consortium" }],
            "container-title": ["Nature"],
            "published": { "date-parts": [[2024, 6, 1]] },
            "link": [
                { "URL": "https://pub.example.org/x.xml", "content-type": "text/xml" },
                { "URL": "https://pub.example.org/x.pdf", "content-type": "application/pdf" }
            ]
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.doi, "10.1000/test");
        assert_eq!(p.title, "Test Paper Title");
        assert_eq!(p.authors, "Jane Doe, Consortium");
        assert_eq!(p.journal, "Nature");
        assert_eq!(p.year, "2024");
        assert_eq!(p.oa_url.as_deref(), Some("https://pub.example.org/x.pdf"));
    }

    #[test]
    fn test_missing_fields_use_markers() {
        let p = work_to_paper(&serde_json::json!({ "title": ["Lonely"] })).unwrap();
        assert_eq!(p.year, UNKNOWN_YEAR);
        assert_eq!(p.journal, UNKNOWN_JOURNAL);
        assert_eq!(p.authors, crate::models::UNKNOWN_AUTHORS);
        assert!(work_to_paper(&serde_json::json!({ "title": [] })).is_none());
    }

    #[test]
    fn test_date_filter() {
        assert_eq!(
            date_filter(&YearRange::new(Some(2001), None)).as_deref(),
            Some("from-pub-date:2001")
        );
        assert_eq!(
            date_filter(&YearRange::new(Some(2001), Some(2003))).as_deref(),
            Some("from-pub-date:2001,until-pub-date:2003")
        );
    }

    #[tokio::test]
    #[ignore = "Hits external CrossRef API"]
    async fn test_crossref_lookup_live() {
        let client = CrossRefClient::new(None).unwrap();
        let paper = client.lookup("10.1038/nature14539").await.unwrap();
        assert!(paper.is_some());
    }
}
