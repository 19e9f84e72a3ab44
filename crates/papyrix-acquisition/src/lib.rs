//! papyrix-acquisition: paper discovery and full-text acquisition.
//! Covers the whole job lifecycle:
//! - Task state tracking with live snapshots
//! - Query generation (LLM-backed with deterministic fallback)
//! - Iterative metadata search with auto-broadening
//! - Deduplication by DOI
//! - Concurrent multi-source PDF racing and validation
//! - Sequential per-task download driver
//! - Result assembly into a per-task output directory

pub mod adapters;
pub mod dedup;
pub mod download;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queries;
pub mod racer;
pub mod report;
pub mod search;
pub mod sources;
pub mod tasks;
pub mod validate;

pub use error::PipelineError;
pub use models::{DownloadResult, FailedDownload, Paper, SourceId, YearRange};
pub use pipeline::{AcquisitionJob, Pipeline, PipelineSettings};
pub use tasks::{Task, TaskStatus, TaskStore, TaskUpdate};
