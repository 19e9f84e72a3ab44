//! Direct open-access link supplied by the metadata provider.

use std::time::Duration;

use async_trait::async_trait;
use papyrix_common::sandbox::SandboxClient;
use tracing::instrument;

use super::{download, FetchedDocument, PdfAdapter};
use crate::models::{Paper, SourceId};

pub struct OpenAccessAdapter {
    client: SandboxClient,
    timeout: Duration,
}

impl OpenAccessAdapter {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: SandboxClient::new()?, timeout })
    }
}

#[async_trait]
impl PdfAdapter for OpenAccessAdapter {
    fn source(&self) -> SourceId {
        SourceId::OpenAccess
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn applies_to(&self, paper: &Paper) -> bool {
        paper.oa_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    #[instrument(skip(self, paper), fields(doi = %paper.doi))]
    async fn fetch(&self, paper: &Paper) -> anyhow::Result<Option<FetchedDocument>> {
        let Some(url) = paper.oa_url.as_deref() else {
            return Ok(None);
        };
        // OA links point at arbitrary publisher and repository hosts.
        download(self.client.get_external(url)?, url).await
    }
}
