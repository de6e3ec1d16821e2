//! Application settings and configuration
//!
//! This module provides configuration management for the key gateway,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;

use crate::services::key_pool::SelectionMode;

/// Main gateway settings
///
/// All values are read once at startup; the key manager copies what it
/// needs at construction time and never re-reads the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Primary Gemini API keys
    pub api_keys: Vec<String>,
    /// Vertex Express API keys
    pub vertex_api_keys: Vec<String>,

    /// Failures before a key is considered invalid
    pub max_failures: u32,
    /// Retry ceiling for a single proxied request
    pub max_retries: u32,

    /// Default key selection mode
    pub key_usage_mode: SelectionMode,
    /// Default usage threshold for fixed mode
    pub key_usage_threshold: u64,

    /// Log level for the tracing subscriber installed by the host binary
    pub log_level: String,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let settings = Self {
            api_keys: parse_key_list(&env_or_default("API_KEYS", "")),
            vertex_api_keys: parse_key_list(&env_or_default("VERTEX_API_KEYS", "")),

            max_failures: env_or_default("MAX_FAILURES", "3")
                .parse()
                .context("Invalid MAX_FAILURES value")?,
            max_retries: env_or_default("MAX_RETRIES", "3")
                .parse()
                .context("Invalid MAX_RETRIES value")?,

            key_usage_mode: env_or_default("KEY_USAGE_MODE", "polling")
                .parse()
                .context("Invalid KEY_USAGE_MODE value")?,
            key_usage_threshold: env_or_default("KEY_USAGE_THRESHOLD", "100")
                .parse()
                .context("Invalid KEY_USAGE_THRESHOLD value")?,

            log_level: env_or_default("LOG_LEVEL", "info"),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    fn validate(&self) -> Result<()> {
        if self.max_failures == 0 {
            anyhow::bail!("MAX_FAILURES must be > 0");
        }
        if self.key_usage_threshold == 0 {
            anyhow::bail!("KEY_USAGE_THRESHOLD must be > 0");
        }

        if self.api_keys.is_empty() {
            tracing::warn!("No API keys configured; the primary pool will be empty");
        }
        if self.vertex_api_keys.is_empty() {
            tracing::warn!("No Vertex Express API keys configured; the vertex pool will be empty");
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            vertex_api_keys: Vec::new(),
            max_failures: 3,
            max_retries: 3,
            key_usage_mode: SelectionMode::Polling,
            key_usage_threshold: 100,
            log_level: "info".to_string(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a comma-separated key list, dropping blanks
fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
