//! papyrix-web: HTTP surface for Papyrix
//! Exposes:
//!   - Topic search and DOI-list task submission
//!   - Task snapshot polling
//!   - Per-task live progress over SSE

pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
