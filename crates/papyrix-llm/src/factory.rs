//! Builds the configured backend from `[llm]`.

use std::sync::Arc;

use papyrix_common::config::LlmConfig;

use crate::backend::{LlmBackend, LlmError, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend};

/// Returns `Ok(None)` when query generation should use the deterministic
/// fallback only (`backend = "none"`).
pub fn backend_from_config(cfg: &LlmConfig) -> Result<Option<Arc<dyn LlmBackend>>, LlmError> {
    let backend: Arc<dyn LlmBackend> = match cfg.backend.as_str() {
        "none" | "" => return Ok(None),
        "ollama" => Arc::new(OllamaBackend::new(&cfg.base_url, &cfg.model)?),
        "openai" => {
            let key = cfg
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::Unavailable("llm.api_key is required for openai".into()))?;
            Arc::new(OpenAiBackend::new(key, &cfg.model)?)
        }
        "openai_compatible" => Arc::new(OpenAiCompatibleBackend::new(
            &cfg.base_url,
            &cfg.model,
            cfg.api_key.clone(),
        )?),
        other => {
            return Err(LlmError::Unavailable(format!("unknown llm backend '{other}'")));
        }
    };
    tracing::info!(model = backend.model_id(), local = backend.is_local(), "LLM backend ready");
    Ok(Some(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backend: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            backend: backend.to_string(),
            api_key: api_key.map(String::from),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_none_disables_backend() {
        assert!(backend_from_config(&cfg("none", None)).unwrap().is_none());
    }

    #[test]
    fn test_default_is_local_ollama() {
        let b = backend_from_config(&LlmConfig::default()).unwrap().unwrap();
        assert!(b.is_local());
    }

    #[test]
    fn test_openai_requires_key() {
        assert!(matches!(
            backend_from_config(&cfg("openai", None)),
            Err(LlmError::Unavailable(_))
        ));
        assert!(backend_from_config(&cfg("openai", Some("sk-x"))).unwrap().is_some());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(backend_from_config(&cfg("gemini", None)).is_err());
    }
}
