//! papyrix-common: Shared errors, the sandboxed HTTP client and
//! configuration loading used across all Papyrix crates.

pub mod config;
pub mod error;
pub mod sandbox;

pub use config::Config;
pub use error::{PapyrixError, Result};
