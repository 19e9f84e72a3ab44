//! Server-Sent Events (SSE) streaming of task snapshots.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use papyrix_acquisition::{Task, TaskStore};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SharedState;

const TASK_EVENT: &str = "task";

/// How long a per-task stream waits quietly before confirming its task still exists.
const LIVENESS_CHECK: Duration = Duration::from_secs(5);

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(15)).text("ping")
}

fn to_event(task: &Task) -> Option<Event> {
    serde_json::to_string(task)
        .ok()
        .map(|data| Event::default().event(TASK_EVENT).id(task.version.to_string()).data(data))
}

/// Every task's snapshots, for dashboards.
pub async fn all_tasks_sse(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe())
        .filter_map(|result| result.ok().and_then(|task| to_event(&task)).map(Ok));
    Sse::new(stream).keep_alive(keep_alive())
}

/// One task's snapshots: the current one first, then each change, closing
/// after the terminal snapshot.
pub async fn task_sse(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading so no change between the two is missed.
    let events = state.subscribe();
    let initial = state
        .store
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))?;

    let (tx, rx) = mpsc::channel(32);
    let store = std::sync::Arc::clone(&state.store);
    tokio::spawn(forward_task(store, events, initial, tx, LIVENESS_CHECK));

    let stream = ReceiverStream::new(rx).filter_map(|task| to_event(&task).map(Ok));
    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

/// Pumps one task's snapshots into `tx` until it is terminal, swept, or the
/// client hangs up.
async fn forward_task(
    store: std::sync::Arc<TaskStore>,
    mut events: broadcast::Receiver<Task>,
    initial: Task,
    tx: mpsc::Sender<Task>,
    check_every: Duration,
) {
    let id = initial.id;
    let mut last_version = initial.version;
    let mut done = initial.status.is_terminal();
    if tx.send(initial).await.is_err() || done {
        return;
    }

    while !done {
        let next = match tokio::time::timeout(check_every, events.recv()).await {
            Ok(Ok(task)) if task.id == id => task,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            // Other tasks' traffic, a quiet period or a lag: the store holds the
            // current snapshot, and a swept task ends the stream.
            other => {
                if let Ok(Err(broadcast::error::RecvError::Lagged(skipped))) = other {
                    tracing::debug!(task_id = %id, skipped, "SSE subscriber lagged, resyncing");
                }
                match store.get(id) {
                    Some(task) => task,
                    None => {
                        tracing::debug!(task_id = %id, "Task swept, closing SSE stream");
                        break;
                    }
                }
            }
        };

        if next.version <= last_version {
            continue;
        }
        last_version = next.version;
        done = next.status.is_terminal();
        if tx.send(next).await.is_err() {
            break;
        }
    }
}
