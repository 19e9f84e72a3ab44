//! Liveness probe.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tasks": state.store.len(),
    }))
}
