//! Iterative search cycle engine with one-shot auto-broadening.
//!
//! One query is one cycle. Cycles run strictly in order until the target
//! number of unique papers is reached or the schedule runs out. Right after
//! cycle `floor(total / 2)` (1-based), if fewer than 80% of the target have
//! been found, every not-yet-run query is replaced by freshly generated broader
//! ones. This happens at most once per task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dedup::DedupIndex;
use crate::error::PipelineError;
use crate::models::{Paper, YearRange};
use crate::queries::{queries_or_fallback, QueryGenerator};
use crate::sources::MetadataSource;
use crate::tasks::{band_progress, TaskStore, TaskUpdate};

pub const PROGRESS_QUERIES_READY: u8 = 10;
pub const PROGRESS_SEARCH_DONE: u8 = 80;
const BROADEN_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub results_per_query: usize,
    pub inter_query_delay: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { results_per_query: 25, inter_query_delay: Duration::from_millis(750) }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub topic: String,
    pub cycles: usize,
    pub target: usize,
    pub year_range: Option<YearRange>,
}

/// 1-based cycle after which the broadening check runs, if any.
pub fn broadening_cycle(total_cycles: usize) -> Option<usize> {
    match total_cycles / 2 {
        0 => None,
        n => Some(n),
    }
}

fn below_threshold(found: usize, target: usize) -> bool {
    (found as f64) < BROADEN_THRESHOLD * target as f64
}

pub struct SearchCycleEngine {
    source: Arc<dyn MetadataSource>,
    generator: Arc<dyn QueryGenerator>,
    store: Arc<TaskStore>,
    settings: SearchSettings,
}

impl SearchCycleEngine {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        generator: Arc<dyn QueryGenerator>,
        store: Arc<TaskStore>,
        settings: SearchSettings,
    ) -> Self {
        Self { source, generator, store, settings }
    }

    #[instrument(skip(self, req), fields(task_id = %task_id, topic = %req.topic))]
    pub async fn run(&self, task_id: Uuid, req: &SearchRequest) -> Result<Vec<Paper>, PipelineError> {
        let total = req.cycles;
        self.store.update(
            task_id,
            TaskUpdate::new().stage("Generating search queries").total_cycles(total),
        );

        let mut queries = queries_or_fallback(self.generator.as_ref(), &req.topic, total, None).await;
        self.store.update(
            task_id,
            TaskUpdate::new()
                .progress(PROGRESS_QUERIES_READY)
                .stage(format!("Generated {} search queries", queries.len())),
        );

        let broaden_after = broadening_cycle(total);
        let mut broadened = false;
        let mut papers: Vec<Paper> = Vec::new();
        let mut index = DedupIndex::new();
        let mut i = 0;

        while i < queries.len() && papers.len() < req.target {
            let cycle = i + 1;
            let query = queries[i].clone();
            self.store.update(
                task_id,
                TaskUpdate::new()
                    .cycle(cycle)
                    .found(papers.len())
                    .progress(band_progress(PROGRESS_QUERIES_READY, PROGRESS_SEARCH_DONE, i, total))
                    .stage(format!("Search cycle {cycle}/{total}: {query}")),
            );

            let batch = match self
                .source
                .search(&query, req.year_range, self.settings.results_per_query)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(cycle, "Metadata search failed, treating as empty: {e:#}");
                    Vec::new()
                }
            };

            let mut added = 0;
            for paper in batch {
                if papers.len() >= req.target {
                    break;
                }
                if index.insert(&paper).is_new() {
                    papers.push(paper);
                    added += 1;
                }
            }
            debug!(cycle, added, total_found = papers.len(), "Cycle finished");

            self.store.update(
                task_id,
                TaskUpdate::new()
                    .found(papers.len())
                    .progress(band_progress(PROGRESS_QUERIES_READY, PROGRESS_SEARCH_DONE, cycle, total)),
            );

            if !broadened && broaden_after == Some(cycle) && below_threshold(papers.len(), req.target) {
                broadened = true;
                let remaining = total.saturating_sub(cycle);
                if remaining > 0 {
                    info!(found = papers.len(), target = req.target, remaining, "Yield low, broadening search");
                    self.store.update(
                        task_id,
                        TaskUpdate::new().stage(format!(
                            "Found {} of {} papers, broadening remaining {remaining} queries",
                            papers.len(),
                            req.target
                        )),
                    );
                    let fresh = queries_or_fallback(
                        self.generator.as_ref(),
                        &req.topic,
                        remaining,
                        Some(papers.as_slice()),
                    )
                    .await;
                    queries.truncate(cycle);
                    queries.extend(fresh);
                }
            }

            i += 1;
            let more = i < queries.len() && papers.len() < req.target;
            if more && !self.settings.inter_query_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_query_delay).await;
            }
        }

        info!(found = papers.len(), cycles_used = i, broadened, "Search finished");
        self.store.update(
            task_id,
            TaskUpdate::new()
                .found(papers.len())
                .progress(PROGRESS_SEARCH_DONE)
                .stage(format!("Found {} unique papers", papers.len())),
        );

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
    fn test_broadening_cycle() {
        assert_eq!(broadening_cycle(0), None);
        assert_eq!(broadening_cycle(1), None);
        assert_eq!(broadening_cycle(3), Some(1));
        assert_eq!(broadening_cycle(10), Some(5));
        assert_eq!(broadening_cycle(11), Some(5));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(below_threshold(7, 10));
        assert!(!below_threshold(8, 10));
        assert!(below_threshold(0, 1));
    }
}
