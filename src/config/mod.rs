//! Environment-driven configuration, loaded once at startup.
//!
//! Grounded on the teacher's `Config::load()` (reads a `.env` file via
//! dotenv, pulls required secrets from the environment, validates them
//! before returning), minus the Discord/Claude-specific field set — this
//! crate is provider-agnostic, so `CLAUDE_API_KEY` becomes `LLM_API_KEY`
//! and the Discord token requirement is dropped entirely.

use std::env;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_API_HOST, DEFAULT_API_PORT, DEFAULT_LLM_TIMEOUT_SECS};
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub max_parallel_tasks: usize,
    pub api_host: String,
    pub api_port: u16,
    pub log_level: String,
}

impl OrchestratorConfig {
    /// Loads configuration from the process environment, falling back to
    /// the values in an `.env` file if present.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(?path, "loaded .env file"),
            Err(_) => tracing::debug!("no .env file found, using process environment"),
        }

        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let llm_api_key = env::var("LLM_API_KEY").ok();

        let llm_timeout_secs = env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);

        let max_parallel_tasks = env::var("MAX_PARALLEL_TASKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);
        if max_parallel_tasks == 0 {
            return Err(OrchestratorError::Configuration(
                "MAX_PARALLEL_TASKS must be at least 1".to_string(),
            ));
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_API_PORT);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            llm_base_url,
            llm_api_key,
            llm_timeout_secs,
            max_parallel_tasks,
            api_host,
            api_port,
            log_level,
        })
    }
}
