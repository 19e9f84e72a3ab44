//! papyrix-llm: chat-completion backends used for search query generation.

pub mod backend;
pub mod factory;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use factory::backend_from_config;
