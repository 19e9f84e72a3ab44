//! Task-fatal pipeline errors. Source and provider failures never reach here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No papers found")]
    NoPapersFound,
    #[error("Invalid job: {0}")]
    InvalidJob(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to store results: {0}")]
    Archive(#[source] anyhow::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}
