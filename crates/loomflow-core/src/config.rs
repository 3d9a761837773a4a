use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub limits: LimitConfig,
    #[serde(default)]
    pub presentation: Option<PresentationConfig>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Self::from_str(&raw)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FlowError::Config(e.to_string()))
    }
}

/// Engine defaults for `retryWithBackoff` nodes; node config overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Per-run execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Upper bound on node executions per run. Portal loop-backs are legal
    /// and unbounded by the graph itself; this converts a runaway loop into
    /// an error instead of a hang.
    #[serde(default = "default_max_node_executions")]
    pub max_node_executions: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_node_executions: default_max_node_executions(),
        }
    }
}

fn default_max_node_executions() -> usize {
    256
}

/// Identity under which context snapshots are published to the presentation
/// sink. Absent ⇒ publishing is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationConfig {
    pub workspace_id: String,
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_on_empty_config() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.limits.max_node_executions, 256);
        assert!(config.presentation.is_none());
    }

    #[test]
    fn partial_sections_fill_remaining_defaults() {
        let config = EngineConfig::from_str(
            r#"
            [retry]
            max_attempts = 5

            [presentation]
            workspace_id = "ws-1"
            request_id = "req-9"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.presentation.unwrap().workspace_id, "ws-1");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        assert!(matches!(
            EngineConfig::from_str("retry = 7"),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_not_found() {
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/loomflow.toml"),
            Err(FlowError::ConfigNotFound(_))
        ));
    }
}
