//! Shared application state for the web server.

use std::sync::Arc;

use papyrix_acquisition::{Pipeline, Task, TaskStore};
use papyrix_common::Config;
use tokio::sync::broadcast;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { store: Arc::clone(pipeline.store()), pipeline }
    }

    /// Builds a fresh store and the configured pipeline around it.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(TaskStore::new());
        let pipeline = Pipeline::from_config(cfg, store)?;
        Ok(Self::new(Arc::new(pipeline)))
    }

    /// Snapshots of every task, as they change.
    pub fn subscribe(&self) -> broadcast::Receiver<Task> {
        self.store.subscribe()
    }
}

pub type SharedState = Arc<AppState>;
