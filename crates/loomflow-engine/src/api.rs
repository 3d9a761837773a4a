use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use loomflow_core::config::RetryConfig;
use loomflow_core::event::FlowEvent;
use loomflow_core::traits::ProviderAdapter;
use loomflow_core::types::{ContextId, FlowContext, ToolDefinition};

use crate::context::IsolatedOptions;
use crate::portal::PortalEntry;
use crate::scheduler::RunShared;

/// Per-invocation capability surface handed to node bodies.
///
/// Everything a node may touch outside its own inputs goes through here:
/// logging, tool listing, the portal side channel, its node-scoped cache
/// slot, and context-registry operations.
pub struct FlowApi {
    shared: Arc<RunShared>,
    node_id: String,
}

impl FlowApi {
    pub(crate) fn new(shared: Arc<RunShared>, node_id: impl Into<String>) -> Self {
        Self {
            shared,
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Structured log line attributed to the executing node.
    pub fn log(&self, message: &str) {
        info!(node_id = %self.node_id, "{}", message);
    }

    /// Publish a flow event to all subscribers.
    pub fn publish(&self, event: FlowEvent) {
        self.shared.events.publish(event);
    }

    /// Tool definitions for the named tools; empty means all registered.
    pub fn list_tools(&self, names: &[String]) -> Vec<ToolDefinition> {
        self.shared.tools.definitions_for(names)
    }

    pub fn provider(&self) -> Arc<dyn ProviderAdapter> {
        self.shared.provider.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Store a portal entry, overwriting any previous one for the id.
    pub async fn portal_set(&self, id: &str, entry: PortalEntry) {
        self.shared.portal.lock().await.set(id, entry);
    }

    pub async fn portal_get(&self, id: &str) -> Option<PortalEntry> {
        self.shared.portal.lock().await.get(id).cloned()
    }

    /// Cache lookup scoped to this node's id.
    pub async fn cache_lookup(
        &self,
        ttl_ms: i64,
        invalidate_ms: Option<i64>,
    ) -> Option<serde_json::Value> {
        let now_ms = self.shared.clock.now_ms();
        self.shared
            .cache
            .lookup(&self.node_id, ttl_ms, invalidate_ms, now_ms)
            .await
    }

    /// Cache write scoped to this node's id.
    pub async fn cache_store(&self, data: serde_json::Value) {
        let now_ms = self.shared.clock.now_ms();
        self.shared.cache.store(&self.node_id, data, now_ms).await;
    }

    /// Spawn an isolated context; nothing is inherited from the active one.
    pub async fn create_isolated(&self, options: IsolatedOptions) -> FlowContext {
        self.shared
            .contexts
            .lock()
            .await
            .create_isolated(options)
            .await
    }

    /// Release a finished isolated branch. Returns false for unknown ids.
    pub async fn release_context(&self, id: &ContextId) -> bool {
        self.shared.contexts.lock().await.release(id).await
    }

    /// Accumulate provider-reported token usage for this run.
    pub fn record_usage(&self, input_tokens: u64, output_tokens: u64) {
        self.shared
            .usage_input
            .fetch_add(input_tokens, Ordering::Relaxed);
        self.shared
            .usage_output
            .fetch_add(output_tokens, Ordering::Relaxed);
    }

    /// Total tokens (input + output) consumed so far in this run.
    pub fn usage_total(&self) -> u64 {
        self.shared.usage_input.load(Ordering::Relaxed)
            + self.shared.usage_output.load(Ordering::Relaxed)
    }

    /// Engine-level retry defaults; node config overrides.
    pub fn retry_defaults(&self) -> RetryConfig {
        self.shared.config.retry.clone()
    }

    /// Attempts recorded for this node instance in the current run.
    pub async fn retry_attempts(&self) -> u32 {
        self.shared
            .retry_attempts
            .lock()
            .await
            .get(&self.node_id)
            .copied()
            .unwrap_or(0)
    }

    /// Record the attempt counter for this node instance; successes reset
    /// it to zero.
    pub async fn set_retry_attempts(&self, attempts: u32) {
        self.shared
            .retry_attempts
            .lock()
            .await
            .insert(self.node_id.clone(), attempts);
    }
}
