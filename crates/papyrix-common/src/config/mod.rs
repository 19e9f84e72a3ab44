//! Configuration loading for Papyrix.
//! Reads papyrix.toml from the current directory or path in PAPYRIX_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PapyrixError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 3001 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which every task gets its own directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String { "./downloads".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 { 3600 }
fn default_sweep_interval_secs() -> u64 { 600 }

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_cycles")]
    pub default_cycles: usize,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_query_delay_ms")]
    pub inter_query_delay_ms: u64,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

fn default_cycles() -> usize { 5 }
fn default_results_per_query() -> usize { 25 }
fn default_query_delay_ms() -> u64 { 750 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_cycles: default_cycles(),
            results_per_query: default_results_per_query(),
            inter_query_delay_ms: default_query_delay_ms(),
            year_from: None,
            year_to: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Source identifiers in launch-priority order.
    #[serde(default = "default_sources")]
    pub enabled_sources: Vec<String>,
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    /// Timeout for direct links and lookup services.
    #[serde(default = "default_short_timeout")]
    pub short_timeout_secs: u64,
    /// Timeout for scrape-and-follow chains across mirrors.
    #[serde(default = "default_long_timeout")]
    pub long_timeout_secs: u64,
    #[serde(default = "default_scihub_mirrors")]
    pub scihub_mirrors: Vec<String>,
    #[serde(default = "default_libgen_mirrors")]
    pub libgen_mirrors: Vec<String>,
    #[serde(default = "default_max_document_mb")]
    pub max_document_mb: u64,
}

fn default_sources() -> Vec<String> {
    vec![
        "open_access".to_string(),
        "unpaywall".to_string(),
        "scihub".to_string(),
        "libgen".to_string(),
    ]
}

fn default_item_delay_ms() -> u64 { 2000 }
fn default_short_timeout() -> u64 { 15 }
fn default_long_timeout() -> u64 { 45 }
fn default_max_document_mb() -> u64 { 50 }

fn default_scihub_mirrors() -> Vec<String> {
    vec![
        "https://sci-hub.se".to_string(),
        "https://sci-hub.st".to_string(),
        "https://sci-hub.ru".to_string(),
    ]
}

fn default_libgen_mirrors() -> Vec<String> {
    vec![
        "https://libgen.is".to_string(),
        "https://libgen.rs".to_string(),
        "https://libgen.st".to_string(),
    ]
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled_sources: default_sources(),
            item_delay_ms: default_item_delay_ms(),
            short_timeout_secs: default_short_timeout(),
            long_timeout_secs: default_long_timeout(),
            scihub_mirrors: default_scihub_mirrors(),
            libgen_mirrors: default_libgen_mirrors(),
            max_document_mb: default_max_document_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// "openalex" | "crossref"
    #[serde(default = "default_metadata_provider")]
    pub metadata: String,
    /// Polite-pool contact; OpenAlex `mailto` and the Unpaywall `email` parameter.
    pub contact_email: Option<String>,
}

fn default_metadata_provider() -> String { "openalex".to_string() }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { metadata: default_metadata_provider(), contact_email: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" | "openai" | "openai_compatible" | "none"
    #[serde(default = "default_llm_backend")]
    pub backend: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
}

fn default_llm_backend() -> String { "ollama".to_string() }
fn default_llm_model() -> String { "llama3:8b".to_string() }
fn default_llm_base_url() -> String { "http://localhost:11434".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key: None,
        }
    }
}

mod tests;

impl Config {
    /// Load configuration from papyrix.toml.
    /// Checks PAPYRIX_CONFIG env var first, then current directory.
    /// A missing file falls back to defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PAPYRIX_CONFIG")
            .unwrap_or_else(|_| "papyrix.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file not found: {path}, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Secrets are usually kept out of the toml file.
    pub fn apply_env_overrides(&mut self) {
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            if let Ok(key) = std::env::var("PAPYRIX_OPENAI_API_KEY") {
                self.llm.api_key = Some(key);
            }
        }
        if self.providers.contact_email.is_none() {
            if let Ok(email) = std::env::var("PAPYRIX_UNPAYWALL_EMAIL") {
                self.providers.contact_email = Some(email);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.default_cycles == 0 {
            return Err(PapyrixError::Config("search.default_cycles must be at least 1".into()));
        }
        if let (Some(from), Some(to)) = (self.search.year_from, self.search.year_to) {
            if from > to {
                return Err(PapyrixError::Config(format!(
                    "search.year_from ({from}) is after search.year_to ({to})"
                )));
            }
        }
        if self.tasks.sweep_interval_secs == 0 {
            return Err(PapyrixError::Config("tasks.sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
