//! In-memory task state store.
//!
//! The store is the single owner of every task record. Each record sits behind
//! its own mutex so writers to one task never block another; the outer map lock
//! is only held long enough to find or insert/remove an entry.
//!
//! Every accepted mutation bumps `version`, refreshes `updated_at` and is
//! broadcast as a full snapshot for SSE consumers. Rules enforced here, not by
//! callers:
//! - status only moves forward (see [`TaskStatus::rank`]); terminal states are final
//! - progress never decreases and stays below 100 until `complete`
//! - `papers_found` is clamped to `papers_requested`

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::ResultLocations;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Searching,
    Collecting,
    Analyzing,
    Comparing,
    Generating,
    Complete,
    Error,
}

impl TaskStatus {
    /// Position in the forward-only lifecycle. Both terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending    => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Searching  => 2,
            TaskStatus::Collecting => 3,
            TaskStatus::Analyzing  => 4,
            TaskStatus::Comparing  => 5,
            TaskStatus::Generating => 6,
            TaskStatus::Complete | TaskStatus::Error => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending    => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Searching  => "searching",
            TaskStatus::Collecting => "collecting",
            TaskStatus::Analyzing  => "analyzing",
            TaskStatus::Comparing  => "comparing",
            TaskStatus::Generating => "generating",
            TaskStatus::Complete   => "complete",
            TaskStatus::Error      => "error",
        }
    }
}

/// Point-in-time view of a task, as polled or pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub stage: String,
    pub papers_requested: usize,
    pub papers_found: usize,
    pub papers_downloaded: usize,
    pub current_cycle: usize,
    pub total_cycles: usize,
    pub error: Option<String>,
    pub result: Option<ResultLocations>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Task {
    fn new(papers_requested: usize, total_cycles: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            progress: 0,
            stage: "Queued".to_string(),
            papers_requested,
            papers_found: 0,
            papers_downloaded: 0,
            current_cycle: 0,
            total_cycles,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn apply(&mut self, upd: TaskUpdate) {
        if let Some(status) = upd.status {
            if status.is_terminal() {
                debug!(task_id = %self.id, "Terminal status must go through complete/fail");
            } else if status.rank() >= self.status.rank() {
                self.status = status;
            } else {
                debug!(task_id = %self.id, from = self.status.as_str(), to = status.as_str(), "Ignoring backward status change");
            }
        }
        if let Some(progress) = upd.progress {
            self.progress = self.progress.max(progress.min(99));
        }
        if let Some(stage) = upd.stage {
            self.stage = stage;
        }
        if let Some(found) = upd.papers_found {
            self.papers_found = found.min(self.papers_requested);
        }
        if let Some(downloaded) = upd.papers_downloaded {
            self.papers_downloaded = downloaded;
        }
        if let Some(cycle) = upd.current_cycle {
            self.current_cycle = cycle;
        }
        if let Some(total) = upd.total_cycles {
            self.total_cycles = total;
        }
    }
}

/// Partial update merged into a task; unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub stage: Option<String>,
    pub papers_found: Option<usize>,
    pub papers_downloaded: Option<usize>,
    pub current_cycle: Option<usize>,
    pub total_cycles: Option<usize>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn found(mut self, n: usize) -> Self {
        self.papers_found = Some(n);
        self
    }

    pub fn downloaded(mut self, n: usize) -> Self {
        self.papers_downloaded = Some(n);
        self
    }

    pub fn cycle(mut self, current: usize) -> Self {
        self.current_cycle = Some(current);
        self
    }

    pub fn total_cycles(mut self, total: usize) -> Self {
        self.total_cycles = Some(total);
        self
    }
}

/// Maps `done` of `total` steps linearly into the `[lo, hi]` progress band.
pub fn band_progress(lo: u8, hi: u8, done: usize, total: usize) -> u8 {
    if total == 0 || hi <= lo {
        return hi.max(lo);
    }
    let span = (hi - lo) as usize;
    lo + (span * done.min(total) / total) as u8
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Arc<Mutex<Task>>>>,
    events: broadcast::Sender<Task>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tasks: RwLock::new(HashMap::new()), events }
    }

    /// Allocates a fresh `pending` task and returns its id.
    pub fn create(&self, papers_requested: usize, total_cycles: usize) -> Uuid {
        let task = Task::new(papers_requested, total_cycles);
        let id = task.id;
        let _ = self.events.send(task.clone());
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(task)));
        debug!(task_id = %id, "Task created");
        id
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        let entry = self.entry(id)?;
        let task = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(task.clone())
    }

    /// Merges `upd` into a live task. Absent or terminal tasks are left alone.
    pub fn update(&self, id: Uuid, upd: TaskUpdate) -> Option<Task> {
        self.mutate(id, |task| task.apply(upd))
    }

    /// Terminal success; progress snaps to 100.
    pub fn complete(&self, id: Uuid, result: Option<ResultLocations>) -> Option<Task> {
        self.mutate(id, |task| {
            task.status = TaskStatus::Complete;
            task.progress = 100;
            task.stage = "Complete".to_string();
            task.result = result;
        })
    }

    /// Terminal failure; progress and counters keep their last values.
    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> Option<Task> {
        let message = message.into();
        self.mutate(id, |task| {
            task.status = TaskStatus::Error;
            task.stage = format!("Failed: {message}");
            task.error = Some(message);
        })
    }

    /// Drops every task not updated within `max_age`. Returns the number removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, entry| {
            let task = entry.lock().unwrap_or_else(PoisonError::into_inner);
            let age = (now - task.updated_at).to_std().unwrap_or_default();
            age <= max_age
        });
        let removed = before - tasks.len();
        if removed > 0 {
            info!(removed, remaining = tasks.len(), "Swept expired tasks");
        }
        removed
    }

    /// Runs [`TaskStore::sweep`] every `interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                store.sweep(max_age);
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Task> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: Uuid) -> Option<Arc<Mutex<Task>>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut Task)) -> Option<Task> {
        let entry = self.entry(id)?;
        let mut task = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if task.status.is_terminal() {
            return None;
        }
        f(&mut *task);
        task.version += 1;
        task.updated_at = Utc::now();
        let snapshot = task.clone();
        // Sent under the task lock so subscribers see versions in order.
        let _ = self.events.send(snapshot.clone());
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_band_progress() {
        assert_eq!(band_progress(10, 80, 0, 10), 10);
        assert_eq!(band_progress(10, 80, 5, 10), 45);
        assert_eq!(band_progress(10, 80, 10, 10), 80);
        assert_eq!(band_progress(10, 80, 12, 10), 80);
        assert_eq!(band_progress(90, 99, 1, 0), 99);
    }

    #[test]
    fn test_create_starts_pending() {
        let store = TaskStore::new();
        let id = store.create(20, 3);
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.papers_requested, 20);
        assert_eq!(task.total_cycles, 3);
        assert_eq!(task.version, 1);
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let store = TaskStore::new();
        let id = store.create(10, 1);
        store.update(id, TaskUpdate::new().progress(40));
        store.update(id, TaskUpdate::new().progress(25));
        assert_eq!(store.get(id).unwrap().progress, 40);
        store.update(id, TaskUpdate::new().progress(100));
        assert_eq!(store.get(id).unwrap().progress, 99);
    }

    #[test]
    fn test_found_clamped_to_requested() {
        let store = TaskStore::new();
        let id = store.create(5, 1);
        let task = store.update(id, TaskUpdate::new().found(12)).unwrap();
        assert_eq!(task.papers_found, 5);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let store = TaskStore::new();
        let id = store.create(5, 1);
        store.update(id, TaskUpdate::new().status(TaskStatus::Collecting));
        let task = store.update(id, TaskUpdate::new().status(TaskStatus::Processing).stage("x")).unwrap();
        assert_eq!(task.status, TaskStatus::Collecting);
        assert_eq!(task.stage, "x");
        let task = store.update(id, TaskUpdate::new().status(TaskStatus::Complete)).unwrap();
        assert_eq!(task.status, TaskStatus::Collecting);
    }

    #[test]
    fn test_complete_snaps_to_100_and_freezes() {
        let store = TaskStore::new();
        let id = store.create(5, 1);
        store.update(id, TaskUpdate::new().progress(60).found(3));
        let done = store.complete(id, None).unwrap();
        assert_eq!(done.status, TaskStatus::Complete);
        assert_eq!(done.progress, 100);
        assert!(store.update(id, TaskUpdate::new().stage("late")).is_none());
        assert!(store.fail(id, "late").is_none());
        assert_eq!(store.get(id).unwrap(), done);
    }

    #[test]
    fn test_fail_keeps_progress_and_counters() {
        let store = TaskStore::new();
        let id = store.create(8, 2);
        store.update(id, TaskUpdate::new().progress(42).found(4).cycle(2));
        let failed = store.fail(id, "No papers found").unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.progress, 42);
        assert_eq!(failed.papers_found, 4);
        assert_eq!(failed.current_cycle, 2);
        assert_eq!(failed.error.as_deref(), Some("No papers found"));
    }

    #[test]
    fn test_update_missing_task_is_noop() {
        let store = TaskStore::new();
        assert!(store.update(Uuid::new_v4(), TaskUpdate::new().progress(5)).is_none());
        assert!(store.complete(Uuid::new_v4(), None).is_none());
    }

    #[test]
    fn test_sweep_removes_stale_tasks() {
        let store = TaskStore::new();
        let old = store.create(1, 1);
        std::thread::sleep(Duration::from_millis(30));
        let fresh = store.create(1, 1);
        assert_eq!(store.sweep(Duration::from_millis(15)), 1);
        assert!(store.get(old).is_none());
        assert!(store.get(fresh).is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_versioned_snapshots() {
        let store = TaskStore::new();
        let mut rx = store.subscribe();
        let id = store.create(3, 1);
        store.update(id, TaskUpdate::new().status(TaskStatus::Processing).progress(5));
        store.complete(id, None);

        let versions: Vec<(u64, TaskStatus)> = (0..3)
            .map(|_| rx.try_recv().map(|t| (t.version, t.status)).unwrap())
            .collect();
        assert_eq!(
            versions,
            vec![
                (1, TaskStatus::Pending),
                (2, TaskStatus::Processing),
                (3, TaskStatus::Complete),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(TaskStore::new());
        let id = store.create(1000, 1);
        let mut handles = Vec::new();
        for worker in 0..8u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for step in 0..50u8 {
                    store.update(id, TaskUpdate::new().progress(worker * 10 + step % 10));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let task = store.get(id).unwrap();
        assert_eq!(task.version, 1 + 8 * 50);
        assert_eq!(task.progress, 79);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let store = Arc::new(TaskStore::new());
        let id = store.create(1, 1);
        let handle = store.spawn_sweeper(Duration::from_millis(20), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.get(id).is_none());
        handle.abort();
    }
}
