use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use loomflow_core::config::RetryConfig;
use loomflow_core::error::{FlowError, Result};
use loomflow_core::flow::{NodeKind, DATA_PORT};

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Wraps a single upstream operation, re-invoking it with exponential
/// backoff while it fails.
///
/// A pushed failure counts as the wrapped operation's first failed attempt;
/// re-invocations pull fresh past the round memo. The attempt counter is
/// kept per node instance in run state and resets on success.
pub struct RetryWithBackoffNode;

impl NodeHandler for RetryWithBackoffNode {
    fn kind(&self) -> NodeKind {
        NodeKind::RetryWithBackoff
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let config = retry_config(&invocation.config, api.retry_defaults());
            let max_attempts = config.max_attempts.max(1);

            // Upstream pushed a good value: nothing to wrap.
            if let Some(value) = invocation.pushed.data() {
                api.set_retry_attempts(0).await;
                return Ok(NodeOutput::success().with_data(value));
            }

            let mut attempt: u32 = 0;
            let mut last_error = invocation
                .pushed
                .first_failure()
                .map(str::to_string);
            if last_error.is_some() {
                attempt = 1;
                api.set_retry_attempts(attempt).await;
            }

            loop {
                if attempt >= max_attempts {
                    let message = last_error
                        .unwrap_or_else(|| "wrapped operation failed".to_string());
                    return Ok(NodeOutput::error(format!(
                        "retry budget exhausted after {attempt} attempts: {message}"
                    )));
                }
                if attempt > 0 {
                    let backoff = calculate_backoff(attempt - 1, &config);
                    warn!(
                        node_id = %invocation.node_id,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying wrapped operation"
                    );
                    tokio::time::sleep(backoff).await;
                }

                let pulled = if attempt == 0 {
                    invocation.inputs.pull(DATA_PORT).await
                } else {
                    invocation.inputs.pull_fresh(DATA_PORT).await
                };
                match pulled {
                    Ok(value) => {
                        api.set_retry_attempts(0).await;
                        return Ok(NodeOutput::success().with_data(value));
                    }
                    Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
                    Err(e @ FlowError::MissingInput { .. }) => {
                        // Nothing wired to retry; retrying cannot help.
                        return Ok(NodeOutput::error(e.to_string()));
                    }
                    Err(e) => {
                        attempt += 1;
                        api.set_retry_attempts(attempt).await;
                        last_error = Some(e.to_string());
                    }
                }
            }
        })
    }
}

fn retry_config(node_config: &serde_json::Value, defaults: RetryConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: node_config
            .get("maxAttempts")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(defaults.max_attempts),
        initial_backoff_ms: node_config
            .get("initialBackoffMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.initial_backoff_ms),
        max_backoff_ms: node_config
            .get("maxBackoffMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.max_backoff_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        // Jitter is 0.8x–1.2x around 100, 200, 350 (capped).
        let b0 = calculate_backoff(0, &config).as_millis() as u64;
        let b1 = calculate_backoff(1, &config).as_millis() as u64;
        let b2 = calculate_backoff(2, &config).as_millis() as u64;
        assert!((80..=120).contains(&b0), "b0 = {b0}");
        assert!((160..=240).contains(&b1), "b1 = {b1}");
        assert!((280..=420).contains(&b2), "b2 = {b2}");
    }

    #[test]
    fn node_config_overrides_defaults() {
        let defaults = RetryConfig::default();
        let config = retry_config(&serde_json::json!({"maxAttempts": 7}), defaults.clone());
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.initial_backoff_ms, defaults.initial_backoff_ms);
    }
}
