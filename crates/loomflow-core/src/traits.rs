use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::PresentationConfig;
use crate::error::Result;
use crate::types::*;

/// Provider adapter — streaming chat/tool-call interface driven by the LLM
/// node.
///
/// The adapter runs tool calls itself, surfacing them as
/// `StreamDelta::ToolStart`/`ToolEnd`. The stream yields at most one terminal
/// condition per invocation: a `Stop` delta or an `Err` item, after which no
/// further deltas are produced.
pub trait ProviderAdapter: Send + Sync + 'static {
    fn agent_stream(
        &self,
        request: StreamRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Tool — extensible tool execution.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in provider tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and invocation identity.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolCallContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;
}

/// Context presentation sink — consumes lifecycle snapshots for UI display.
///
/// Failures here must never abort a flow run; callers log and continue.
pub trait ContextSink: Send + Sync + 'static {
    fn set_contexts_for(
        &self,
        identity: &PresentationConfig,
        snapshot: ContextSnapshot,
    ) -> BoxFuture<'_, Result<()>>;

    fn clear_contexts_for(&self, identity: &PresentationConfig) -> BoxFuture<'_, Result<()>>;
}

/// Stored cache record: the memoized value and when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub data: serde_json::Value,
    pub timestamp_ms: i64,
}

/// Durable node-cache backing store, mirroring the in-memory hit/miss
/// contract across process restarts.
pub trait CacheStore: Send + Sync + 'static {
    fn get(&self, node_id: &str) -> BoxFuture<'_, Result<Option<CacheRecord>>>;

    fn set(&self, node_id: &str, record: CacheRecord) -> BoxFuture<'_, Result<()>>;

    fn clear(&self, node_id: &str) -> BoxFuture<'_, Result<()>>;
}
