//! OpenAlex works client.
//!
//! API: https://api.openalex.org/works
//! Polite pool: pass `mailto` so requests are routed to the faster pool.

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient as Client;
use tracing::{debug, instrument};

use super::{join_authors, MetadataSource};
use crate::models::{normalize_doi, Paper, YearRange, UNKNOWN_JOURNAL, UNKNOWN_YEAR};

const OA_WORKS_URL: &str = "https://api.openalex.org/works";
const OA_MAX_PER_PAGE: usize = 200;

pub struct OpenAlexClient {
    client: Client,
    mailto: Option<String>,
}

impl OpenAlexClient {
    pub fn new(mailto: Option<String>) -> anyhow::Result<Self> {
        let ua = match &mailto {
            Some(m) => format!("Papyrix/0.1 (mailto:{m})"),
            None => "Papyrix/0.1".to_string(),
        };
        Ok(Self { client: Client::with_user_agent(&ua)?, mailto })
    }

    fn with_mailto(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(m) = &self.mailto {
            params.push(("mailto", m.clone()));
        }
        params
    }
}

#[async_trait]
impl MetadataSource for OpenAlexClient {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        year_range: Option<YearRange>,
        limit: usize,
    ) -> anyhow::Result<Vec<Paper>> {
        let mut params = vec![
            ("search", query.trim().to_string()),
            ("per-page", limit.clamp(1, OA_MAX_PER_PAGE).to_string()),
        ];
        if let Some(filter) = year_range.and_then(|r| year_filter(&r)) {
            params.push(("filter", filter));
        }
        let params = self.with_mailto(params);

        let resp = self.client.get(OA_WORKS_URL)?.query(&params).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("OpenAlex search returned status {}", resp.status());
        }
        let body: serde_json::Value = resp.json().await?;
        let papers: Vec<Paper> = body["results"]
            .as_array()
            .map(|works| works.iter().filter_map(work_to_paper).collect())
            .unwrap_or_default();
        debug!(n = papers.len(), "OpenAlex search results");
        Ok(papers)
    }

    #[instrument(skip(self))]
    async fn lookup(&self, doi: &str) -> anyhow::Result<Option<Paper>> {
        let url = format!("{}/doi:{}", OA_WORKS_URL, normalize_doi(doi));
        let params = self.with_mailto(Vec::new());
        let resp = self.client.get(&url)?.query(&params).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("OpenAlex lookup returned status {}", resp.status());
        }
        let work: serde_json::Value = resp.json().await?;
        Ok(work_to_paper(&work))
    }

    fn name(&self) -> &'static str {
        "openalex"
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn year_filter(range: &YearRange) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(from) = range.from {
        parts.push(format!("from_publication_date:{from}-01-01"));
    }
    if let Some(to) = range.to {
        parts.push(format!("to_publication_date:{to}-12-31"));
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

fn work_to_paper(work: &serde_json::Value) -> Option<Paper> {
    let title = work["display_name"]
        .as_str()
        .or_else(|| work["title"].as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let doi = work["doi"].as_str().map(normalize_doi).unwrap_or_default();

    let year = work["publication_year"]
        .as_i64()
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    let journal = work["primary_location"]["source"]["display_name"]
        .as_str()
        .unwrap_or(UNKNOWN_JOURNAL)
        .to_string();

    let authors = join_authors(
        work["authorships"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|a| a["author"]["display_name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
    );

    let oa_url = work["best_oa_location"]["pdf_url"]
        .as_str()
        .or_else(|| work["primary_location"]["pdf_url"].as_str())
        .map(String::from);

    Some(Paper { title, journal, year, authors, doi, oa_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_work_to_paper_full() {
        let work = serde_json::json!({
            "doi": "https://doi.org/10.1038/NATURE14539",
            "display_name": "Deep learning",
            "publication_year": 2015,
            "primary_location": { "source": { "display_name": "Nature" }, "pdf_url": null },
            "best_oa_location": { "pdf_url": "https://repo.example.org/dl.pdf" },
            "authorships": [
                { "author": { "display_name": "Yann LeCun" } },
                { "author": { "display_name": "Yoshua Bengio" } }
            ]
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.doi, "10.1038/nature14539");
        assert_eq!(p.year, "2015");
        assert_eq!(p.journal, "Nature");
        assert_eq!(p.authors, "Yann LeCun, Yoshua Bengio");
        assert_eq!(p.oa_url.as_deref(), Some("https://repo.example.org/dl.pdf"));
    }

    #[test]
    fn test_work_to_paper_sparse() {
        let work = serde_json::json!({ "title": "Untracked preprint", "doi": null });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.doi, "");
        assert_eq!(p.year, UNKNOWN_YEAR);
        assert_eq!(p.journal, UNKNOWN_JOURNAL);
        assert!(p.oa_url.is_none());
        assert!(work_to_paper(&serde_json::json!({ "display_name": "  " })).is_none());
    }

    #[test]
    fn test_year_filter() {
        assert_eq!(year_filter(&YearRange::default()), None);
        assert_eq!(
            year_filter(&YearRange::new(Some(2015), Some(2020))).as_deref(),
            Some("from_publication_date:2015-01-01,to_publication_date:2020-12-31")
        );
        assert_eq!(
            year_filter(&YearRange::new(None, Some(2010))).as_deref(),
            Some("to_publication_date:2010-12-31")
        );
    }

    #[tokio::test]
    #[ignore = "Hits external OpenAlex API"]
    async fn test_openalex_search_live() {
        let client = OpenAlexClient::new(None).unwrap();
        let papers = client.search("graph neural networks", None, 5).await.unwrap();
        assert!(!papers.is_empty());
    }
}
