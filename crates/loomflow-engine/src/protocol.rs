use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use loomflow_core::error::{FlowError, Result};
use loomflow_core::flow::{NodeKind, CONTEXT_PORT, DATA_PORT};
use loomflow_core::types::{FlowContext, ToolDefinition};

use crate::api::FlowApi;
use crate::scheduler::RunShared;

/// Outcome status of a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node completed; outputs fan out along its edges.
    Success,
    /// Node-local failure, surfaced without crashing the run.
    Error,
    /// Deliberate pause; the run suspends until externally resumed.
    Waiting,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Waiting => "waiting",
        }
    }
}

/// When a node becomes eligible to run given partial or complete inbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Fires as soon as any inbound edge delivers.
    Any,
    /// Fires only once every wired inbound edge has delivered.
    All,
}

/// Static metadata attached to a node's result.
#[derive(Debug, Clone, Default)]
pub struct OutputMetadata {
    /// Whether a cache node served this result from its store.
    pub cached: Option<bool>,
    /// Output handle the node's data fans out on; `None` means every
    /// data handle (router nodes set this).
    pub route: Option<String>,
}

/// The uniform result every node execution produces.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub context: Option<FlowContext>,
    pub data: Option<serde_json::Value>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub status: NodeStatus,
    pub error: Option<String>,
    pub metadata: OutputMetadata,
}

impl NodeOutput {
    pub fn success() -> Self {
        Self {
            context: None,
            data: None,
            tools: None,
            status: NodeStatus::Success,
            error: None,
            metadata: OutputMetadata::default(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Error,
            error: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn waiting() -> Self {
        Self {
            status: NodeStatus::Waiting,
            ..Self::success()
        }
    }

    pub fn with_context(mut self, context: FlowContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_route(mut self, handle: impl Into<String>) -> Self {
        self.metadata.route = Some(handle.into());
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.metadata.cached = Some(cached);
        self
    }
}

/// What an edge delivers to an input port.
///
/// Failures are only deliverable to error-aware consumers; for everything
/// else an upstream error stops the run.
#[derive(Debug, Clone)]
pub enum PortPayload {
    Value(serde_json::Value),
    Failure(String),
}

/// Values already delivered to a node when it fires.
#[derive(Debug, Clone, Default)]
pub struct PushedInputs {
    /// Context delivered on the inbound `context` edge, if any.
    pub context: Option<FlowContext>,
    /// Data delivered to named input ports.
    pub ports: HashMap<String, PortPayload>,
    /// External resumption payload, present only when re-executing a node
    /// that previously returned `Waiting`.
    pub resume: Option<serde_json::Value>,
}

impl PushedInputs {
    pub fn port(&self, name: &str) -> Option<&PortPayload> {
        self.ports.get(name)
    }

    /// The value delivered to `name`, if it was a normal value.
    pub fn value(&self, name: &str) -> Option<serde_json::Value> {
        match self.ports.get(name) {
            Some(PortPayload::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    /// The value on the default data port.
    pub fn data(&self) -> Option<serde_json::Value> {
        self.value(DATA_PORT)
    }

    /// First delivered failure, if any port carries one.
    pub fn first_failure(&self) -> Option<&str> {
        self.ports.values().find_map(|p| match p {
            PortPayload::Failure(msg) => Some(msg.as_str()),
            _ => None,
        })
    }
}

/// Lazy, on-demand access to upstream values not already pushed.
///
/// Pulling executes the wired upstream node through the scheduler and
/// memoizes the result for the remainder of the round.
pub struct NodeInputs {
    shared: Arc<RunShared>,
    node_id: String,
    /// target handle -> (source node, source handle)
    wired: HashMap<String, (String, String)>,
}

impl NodeInputs {
    pub(crate) fn new(
        shared: Arc<RunShared>,
        node_id: impl Into<String>,
        wired: HashMap<String, (String, String)>,
    ) -> Self {
        Self {
            shared,
            node_id: node_id.into(),
            wired,
        }
    }

    /// Whether an upstream edge is wired to `port`.
    pub fn has(&self, port: &str) -> bool {
        self.wired.contains_key(port)
    }

    /// Pull the data value wired to `port`, executing upstream on demand.
    pub async fn pull(&self, port: &str) -> Result<serde_json::Value> {
        let (handle, output) = self.pull_inner(port, false).await?;
        Ok(extract_data(&handle, &output))
    }

    /// Pull bypassing (and replacing) the round memo. Used by the retry
    /// wrapper to re-invoke the wrapped operation.
    pub async fn pull_fresh(&self, port: &str) -> Result<serde_json::Value> {
        let (handle, output) = self.pull_inner(port, true).await?;
        Ok(extract_data(&handle, &output))
    }

    /// Pull tool definitions wired to `port`.
    pub async fn pull_tools(&self, port: &str) -> Result<Vec<ToolDefinition>> {
        let (_, output) = self.pull_inner(port, false).await?;
        Ok(output.tools.unwrap_or_default())
    }

    /// Pull the context wired to `port` (usually `context`).
    pub async fn pull_context(&self, port: &str) -> Result<Option<FlowContext>> {
        let (_, output) = self.pull_inner(port, false).await?;
        Ok(output.context)
    }

    async fn pull_inner(&self, port: &str, fresh: bool) -> Result<(String, NodeOutput)> {
        let (source, source_handle) = self.wired.get(port).cloned().ok_or_else(|| {
            FlowError::MissingInput {
                node: self.node_id.clone(),
                port: port.to_string(),
            }
        })?;

        let output = self.shared.pull_output(&source, fresh).await?;
        if output.status == NodeStatus::Error {
            return Err(FlowError::NodeExecution {
                node: source,
                message: output
                    .error
                    .unwrap_or_else(|| "upstream node failed".to_string()),
            });
        }
        Ok((source_handle, output))
    }
}

/// Extract the value a given source handle carries out of a node output.
fn extract_data(source_handle: &str, output: &NodeOutput) -> serde_json::Value {
    if source_handle == CONTEXT_PORT {
        return output
            .context
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or(serde_json::Value::Null);
    }
    if let Some(route) = &output.metadata.route {
        if route != source_handle {
            return serde_json::Value::Null;
        }
    }
    output.data.clone().unwrap_or(serde_json::Value::Null)
}

/// One node execution's worth of inputs, handed to the handler.
pub struct NodeInvocation {
    pub node_id: String,
    pub config: serde_json::Value,
    /// The active context resolved by the lifecycle manager.
    pub context: FlowContext,
    pub pushed: PushedInputs,
    pub inputs: NodeInputs,
}

/// A registered node implementation.
///
/// Handlers are pure(ish): all collaborator access goes through the
/// `FlowApi` capability surface.
pub trait NodeHandler: Send + Sync + 'static {
    fn kind(&self) -> NodeKind;

    fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::Any
    }

    /// Pull-only nodes never auto-execute from a push; they run only when a
    /// downstream consumer pulls them.
    fn pull_only(&self) -> bool {
        false
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>>;
}

/// Init-time map from node kind to implementation. Unknown kinds are
/// rejected at graph load, not at execution time.
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own kind.
    pub fn register(&mut self, handler: impl NodeHandler) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Create a registry with every built-in node registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::nodes::chat_input::ChatInputNode);
        registry.register(crate::nodes::llm_request::LlmRequestNode);
        registry.register(crate::nodes::tools::ToolsNode);
        registry.register(crate::nodes::cache::CacheNode);
        registry.register(crate::nodes::portal::PortalInputNode);
        registry.register(crate::nodes::portal::PortalOutputNode);
        registry.register(crate::nodes::new_context::NewContextNode);
        registry.register(crate::nodes::conditional::ConditionalNode);
        registry.register(crate::nodes::parallel::ParallelSplitNode);
        registry.register(crate::nodes::parallel::ParallelJoinNode);
        registry.register(crate::nodes::approval::ApprovalGateNode);
        registry.register(crate::nodes::budget::BudgetGuardNode);
        registry.register(crate::nodes::retry::RetryWithBackoffNode);
        registry.register(crate::nodes::error_detection::ErrorDetectionNode);
        registry
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_kind() {
        let registry = NodeRegistry::with_builtins();
        for kind in [
            NodeKind::ChatInput,
            NodeKind::LlmRequest,
            NodeKind::Tools,
            NodeKind::Cache,
            NodeKind::PortalInput,
            NodeKind::PortalOutput,
            NodeKind::NewContext,
            NodeKind::Conditional,
            NodeKind::ParallelSplit,
            NodeKind::ParallelJoin,
            NodeKind::ApprovalGate,
            NodeKind::BudgetGuard,
            NodeKind::RetryWithBackoff,
            NodeKind::ErrorDetection,
        ] {
            assert!(registry.get(kind).is_some(), "missing handler for {kind}");
        }
    }

    #[test]
    fn pull_only_flags() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.get(NodeKind::Tools).unwrap().pull_only());
        assert!(registry.get(NodeKind::PortalOutput).unwrap().pull_only());
        assert!(!registry.get(NodeKind::Cache).unwrap().pull_only());
    }

    #[test]
    fn join_policy_is_all() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            registry.get(NodeKind::ParallelJoin).unwrap().policy(),
            ExecutionPolicy::All
        );
        assert_eq!(
            registry.get(NodeKind::LlmRequest).unwrap().policy(),
            ExecutionPolicy::Any
        );
    }

    #[test]
    fn pushed_inputs_accessors() {
        let mut pushed = PushedInputs::default();
        pushed
            .ports
            .insert("data".into(), PortPayload::Value(serde_json::json!(1)));
        pushed
            .ports
            .insert("data-2".into(), PortPayload::Failure("boom".into()));

        assert_eq!(pushed.data(), Some(serde_json::json!(1)));
        assert_eq!(pushed.value("data-2"), None);
        assert_eq!(pushed.first_failure(), Some("boom"));
    }

    #[test]
    fn route_filters_extraction() {
        let output = NodeOutput::success()
            .with_data(serde_json::json!("x"))
            .with_route("out-1");
        assert_eq!(extract_data("out-1", &output), serde_json::json!("x"));
        assert_eq!(extract_data("out-2", &output), serde_json::Value::Null);
    }
}
