//! End-to-end acquisition pipeline.
//!
//! Orchestrates the full flow for a single task:
//!   1. Collect papers (topic search with auto-broadening, or DOI list lookup)
//!   2. Race every enabled source for each paper, one paper at a time
//!   3. Hand the listings and files to the archive sink
//!   4. Mark the task complete, or failed with a readable message
//!
//! `submit` returns as soon as the task exists; the run itself is detached
//! from the caller and always ends in a terminal task state.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use papyrix_common::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::build_adapters;
use crate::dedup::DedupIndex;
use crate::download::DownloadDriver;
use crate::error::PipelineError;
use crate::models::{is_valid_doi, normalize_doi, Paper, ResultLocations, SourceId, YearRange};
use crate::queries::{FallbackQueryGenerator, LlmQueryGenerator, QueryGenerator};
use crate::racer::SourceRacer;
use crate::report::{render_failed, render_metadata, summarize, ArchiveSink, DirectorySink, PAPERS_DIR};
use crate::search::{SearchCycleEngine, SearchRequest, SearchSettings, PROGRESS_QUERIES_READY, PROGRESS_SEARCH_DONE};
use crate::sources::{source_from_config, MetadataSource};
use crate::tasks::{band_progress, TaskStatus, TaskStore, TaskUpdate};

pub const PROGRESS_STARTED: u8 = 5;
pub const PROGRESS_PREPARING: u8 = 85;

// ── Job ───────────────────────────────────────────────────────────────────────

/// What a task should acquire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AcquisitionJob {
    /// Search by topic for up to `target` papers over `cycles` queries.
    Topic {
        topic: String,
        cycles: usize,
        target: usize,
        year_range: Option<YearRange>,
    },
    /// Acquire an explicit list of DOIs.
    DoiList { dois: Vec<String> },
}

impl AcquisitionJob {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            AcquisitionJob::Topic { topic, cycles, target, year_range } => {
                if topic.trim().is_empty() {
                    return Err(PipelineError::InvalidJob("topic is empty".into()));
                }
                if *cycles == 0 {
                    return Err(PipelineError::InvalidJob("cycles must be at least 1".into()));
                }
                if *target == 0 {
                    return Err(PipelineError::InvalidJob("target must be at least 1".into()));
                }
                if let Some(YearRange { from: Some(from), to: Some(to) }) = year_range {
                    if from > to {
                        return Err(PipelineError::InvalidJob(format!(
                            "year range {from}-{to} is inverted"
                        )));
                    }
                }
                Ok(())
            }
            AcquisitionJob::DoiList { dois } => {
                if dois.iter().all(|d| d.trim().is_empty()) {
                    return Err(PipelineError::InvalidJob("DOI list is empty".into()));
                }
                Ok(())
            }
        }
    }

    fn papers_requested(&self) -> usize {
        match self {
            AcquisitionJob::Topic { target, .. } => *target,
            AcquisitionJob::DoiList { dois } => dois.len(),
        }
    }

    fn total_cycles(&self) -> usize {
        match self {
            AcquisitionJob::Topic { cycles, .. } => *cycles,
            AcquisitionJob::DoiList { .. } => 0,
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub search: SearchSettings,
    pub item_delay: Duration,
    pub default_cycles: usize,
    pub default_year_range: Option<YearRange>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let range = YearRange::new(cfg.search.year_from, cfg.search.year_to);
        Self {
            output_dir: PathBuf::from(&cfg.storage.output_dir),
            search: SearchSettings {
                results_per_query: cfg.search.results_per_query,
                inter_query_delay: Duration::from_millis(cfg.search.inter_query_delay_ms),
            },
            item_delay: Duration::from_millis(cfg.download.item_delay_ms),
            default_cycles: cfg.search.default_cycles,
            default_year_range: (!range.is_open()).then_some(range),
        }
    }

    /// Same settings with every pause removed.
    pub fn without_delays(mut self) -> Self {
        self.search.inter_query_delay = Duration::ZERO;
        self.item_delay = Duration::ZERO;
        self
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    store: Arc<TaskStore>,
    source: Arc<dyn MetadataSource>,
    engine: SearchCycleEngine,
    driver: DownloadDriver,
    sink: Arc<dyn ArchiveSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<TaskStore>,
        source: Arc<dyn MetadataSource>,
        generator: Arc<dyn QueryGenerator>,
        racer: Arc<SourceRacer>,
        sink: Arc<dyn ArchiveSink>,
        settings: PipelineSettings,
    ) -> Self {
        let engine = SearchCycleEngine::new(
            Arc::clone(&source),
            generator,
            Arc::clone(&store),
            settings.search.clone(),
        );
        let driver = DownloadDriver::new(racer, Arc::clone(&store), settings.item_delay);
        Self { store, source, engine, driver, sink, settings }
    }

    /// Wires the real providers, adapters and sink from configuration.
    pub fn from_config(cfg: &Config, store: Arc<TaskStore>) -> anyhow::Result<Self> {
        let source = source_from_config(&cfg.providers)?;

        let generator: Arc<dyn QueryGenerator> = match papyrix_llm::backend_from_config(&cfg.llm) {
            Ok(Some(backend)) => Arc::new(LlmQueryGenerator::new(backend)),
            Ok(None) => Arc::new(FallbackQueryGenerator),
            Err(e) => {
                warn!("LLM backend unavailable, using fallback queries only: {e}");
                Arc::new(FallbackQueryGenerator)
            }
        };

        let enabled = SourceId::parse_list(&cfg.download.enabled_sources);
        let adapters = build_adapters(&cfg.download, cfg.providers.contact_email.clone())?;
        let max_bytes = (cfg.download.max_document_mb as usize).saturating_mul(1024 * 1024);
        let racer = SourceRacer::new(adapters, &enabled).with_max_bytes(max_bytes);
        info!(sources = ?racer.sources(), provider = source.name(), "Pipeline ready");

        Ok(Self::new(
            store,
            source,
            generator,
            Arc::new(racer),
            Arc::new(DirectorySink),
            PipelineSettings::from_config(cfg),
        ))
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Creates the task and runs the job in the background.
    pub fn submit(self: &Arc<Self>, job: AcquisitionJob) -> Result<Uuid, PipelineError> {
        job.validate()?;
        let task_id = self.store.create(job.papers_requested(), job.total_cycles());
        info!(task_id = %task_id, "Task submitted");

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let worker = {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.run(task_id, job).await })
            };
            // A panic inside the run still has to end the task.
            if let Err(e) = worker.await {
                error!(task_id = %task_id, "Pipeline worker crashed: {e}");
                pipeline.store.fail(task_id, PipelineError::Internal(e.to_string()).to_string());
            }
        });
        Ok(task_id)
    }

    /// Runs a job for an existing task to a terminal state.
    pub async fn run(&self, task_id: Uuid, job: AcquisitionJob) {
        match self.execute(task_id, job).await {
            Ok(locations) => {
                self.store.complete(task_id, Some(locations));
                info!(task_id = %task_id, "Task complete");
            }
            Err(e) => {
                warn!(task_id = %task_id, "Task failed: {e}");
                self.store.fail(task_id, e.to_string());
            }
        }
    }

    #[instrument(skip(self, job), fields(task_id = %task_id))]
    async fn execute(&self, task_id: Uuid, job: AcquisitionJob) -> Result<ResultLocations, PipelineError> {
        self.store.update(
            task_id,
            TaskUpdate::new()
                .status(TaskStatus::Processing)
                .progress(PROGRESS_STARTED)
                .stage("Starting"),
        );
        self.store.update(task_id, TaskUpdate::new().status(TaskStatus::Searching));

        let papers = match job {
            AcquisitionJob::Topic { topic, cycles, target, year_range } => {
                let req = SearchRequest {
                    topic,
                    cycles,
                    target,
                    year_range: year_range.or(self.settings.default_year_range),
                };
                self.engine.run(task_id, &req).await?
            }
            AcquisitionJob::DoiList { dois } => self.lookup_dois(task_id, &dois).await?,
        };

        self.store.update(
            task_id,
            TaskUpdate::new()
                .status(TaskStatus::Collecting)
                .found(papers.len())
                .progress(PROGRESS_PREPARING)
                .stage(format!("Preparing to download {} papers", papers.len())),
        );

        let task_dir = self.settings.output_dir.join(task_id.to_string());
        let papers_dir = task_dir.join(PAPERS_DIR);
        let report = self.driver.run(task_id, &papers, &papers_dir).await?;

        let metadata = render_metadata(&papers, &report.downloaded);
        let failed = (!report.failed.is_empty()).then(|| render_failed(&report.failed));
        let files: Vec<PathBuf> = report.downloaded.iter().map(|d| d.path.clone()).collect();
        let locations = self
            .sink
            .store(&task_dir, &metadata, failed.as_deref(), &files)
            .await
            .map_err(PipelineError::Archive)?;

        let summary = summarize(&report);
        info!(found = summary.found, downloaded = summary.downloaded, failed = summary.failed, "Task results stored");
        Ok(locations)
    }

    /// Looks up each valid, distinct DOI. Lookup failures count as not-found.
    async fn lookup_dois(&self, task_id: Uuid, dois: &[String]) -> Result<Vec<Paper>, PipelineError> {
        let mut seen = HashSet::new();
        let valid: Vec<String> = dois
            .iter()
            .map(|d| normalize_doi(d))
            .filter(|d| {
                let ok = is_valid_doi(d);
                if !ok {
                    debug!(doi = %d, "Skipping invalid DOI");
                }
                ok
            })
            .filter(|d| seen.insert(d.clone()))
            .collect();

        let total = valid.len();
        self.store.update(
            task_id,
            TaskUpdate::new()
                .progress(PROGRESS_QUERIES_READY)
                .stage(format!("Looking up {total} DOIs")),
        );

        let mut papers = Vec::new();
        let mut index = DedupIndex::new();
        for (i, doi) in valid.iter().enumerate() {
            self.store.update(
                task_id,
                TaskUpdate::new()
                    .progress(band_progress(PROGRESS_QUERIES_READY, PROGRESS_SEARCH_DONE, i, total))
                    .stage(format!("Looking up DOI {}/{}: {doi}", i + 1, total)),
            );

            match self.source.lookup(doi).await {
                Ok(Some(mut paper)) => {
                    if !paper.has_doi() {
                        paper.doi = doi.clone();
                    }
                    if index.insert(&paper).is_new() {
                        papers.push(paper);
                    }
                }
                Ok(None) => debug!(%doi, "DOI not found"),
                Err(e) => warn!(%doi, "DOI lookup failed, skipping: {e:#}"),
            }

            self.store.update(
                task_id,
                TaskUpdate::new()
                    .found(papers.len())
                    .progress(band_progress(PROGRESS_QUERIES_READY, PROGRESS_SEARCH_DONE, i + 1, total)),
            );

            if i + 1 < total && !self.settings.search.inter_query_delay.is_zero() {
                tokio::time::sleep(self.settings.search.inter_query_delay).await;
            }
        }

        if papers.is_empty() {
            return Err(PipelineError::NoPapersFound);
        }
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_validation() {
        let topic = |t: &str, cycles, target| AcquisitionJob::Topic {
            topic: t.to_string(),
            cycles,
            target,
            year_range: None,
        };
        assert!(topic("graph neural networks", 3, 20).validate().is_ok());
        assert!(topic("  ", 3, 20).validate().is_err());
        assert!(topic("x", 0, 20).validate().is_err());
        assert!(topic("x", 3, 0).validate().is_err());
        let inverted = AcquisitionJob::Topic {
            topic: "x".into(),
            cycles: 1,
            target: 1,
            year_range: Some(YearRange::new(Some(2020), Some(2010))),
        };
        assert!(matches!(inverted.validate(), Err(PipelineError::InvalidJob(_))));
        assert!(AcquisitionJob::DoiList { dois: vec![" ".into()] }.validate().is_err());
        assert!(AcquisitionJob::DoiList { dois: vec!["bogus".into()] }.validate().is_ok());
    }

    #[test]
    fn test_settings_from_config() {
        let mut cfg = Config::default();
        cfg.search.year_from = Some(2018);
        let s = PipelineSettings::from_config(&cfg);
        assert_eq!(s.default_year_range, Some(YearRange::new(Some(2018), None)));
        assert_eq!(s.item_delay, Duration::from_millis(2000));
        assert!(PipelineSettings::default().default_year_range.is_none());
        assert!(s.without_delays().item_delay.is_zero());
    }

    #[test]
    fn test_job_wire_format() {
        let job: AcquisitionJob = serde_json::from_value(serde_json::json!({
            "mode": "doi_list",
            "dois": ["10.1/a"]
        }))
        .unwrap();
        assert!(matches!(job, AcquisitionJob::DoiList { ref dois } if dois.len() == 1));
    }
}
