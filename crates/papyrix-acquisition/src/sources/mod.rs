//! Paper metadata providers.

pub mod crossref;
pub mod openalex;

use std::sync::Arc;

use async_trait::async_trait;
use papyrix_common::config::ProviderConfig;

use crate::models::{Paper, YearRange};

/// Common interface for all metadata providers.
///
/// Implementations return `Err` freely; callers in the search engine treat a
/// failed search as zero-yield and a failed lookup as not-found.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Search for papers matching a free-text query.
    async fn search(
        &self,
        query: &str,
        year_range: Option<YearRange>,
        limit: usize,
    ) -> anyhow::Result<Vec<Paper>>;

    /// Resolve a single DOI; `Ok(None)` when the provider has no record.
    async fn lookup(&self, doi: &str) -> anyhow::Result<Option<Paper>>;

    fn name(&self) -> &'static str;
}

/// Builds the provider named in `[providers] metadata`.
pub fn source_from_config(cfg: &ProviderConfig) -> anyhow::Result<Arc<dyn MetadataSource>> {
    let email = cfg.contact_email.clone();
    match cfg.metadata.as_str() {
        "openalex" => Ok(Arc::new(openalex::OpenAlexClient::new(email)?)),
        "crossref" => Ok(Arc::new(crossref::CrossRefClient::new(email)?)),
        other => anyhow::bail!("unknown metadata provider '{other}'"),
    }
}

/// Joins author names, falling back to the unknown marker.
pub(crate) fn join_authors(names: Vec<String>) -> String {
    let names: Vec<String> = names.into_iter().filter(|n| !n.trim().is_empty()).collect();
    if names.is_empty() {
        crate::models::UNKNOWN_AUTHORS.to_string()
    } else {
        names.join(", ")
    }
}
