use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use loomflow_core::config::EngineConfig;
use loomflow_core::error::{FlowError, Result};
use loomflow_core::event::{EventBus, FlowEvent, FlowStatus};
use loomflow_core::flow::{FlowDefinition, FlowEdge, NodeKind};
use loomflow_core::traits::{CacheStore, ContextSink, ProviderAdapter};
use loomflow_core::types::{FlowContext, RunId};

use crate::api::FlowApi;
use crate::cache::{Clock, NodeCache, WallClock};
use crate::context::ContextManager;
use crate::portal::PortalRegistry;
use crate::protocol::{
    NodeInputs, NodeInvocation, NodeOutput, NodeRegistry, NodeStatus, PortPayload, PushedInputs,
};
use crate::tools::ToolRegistry;

/// Collaborators the engine drives a run against.
#[derive(Clone)]
pub struct EngineServices {
    pub provider: Arc<dyn ProviderAdapter>,
    pub tools: Arc<ToolRegistry>,
    pub sink: Option<Arc<dyn ContextSink>>,
    pub cache_store: Option<Arc<dyn CacheStore>>,
    pub events: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
}

impl EngineServices {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            sink: None,
            cache_store: None,
            events: Arc::new(EventBus::default()),
            clock: Arc::new(WallClock),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ContextSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Values staged at a node's input ports between deliveries and execution.
#[derive(Debug, Clone, Default)]
pub(crate) struct StagedInputs {
    pub context: Option<FlowContext>,
    pub ports: HashMap<String, PortPayload>,
    /// Edge keys that have delivered since this node last fired.
    pub delivered: HashSet<String>,
}

fn edge_key(edge: &FlowEdge) -> String {
    format!(
        "{}:{}->{}",
        edge.source, edge.source_handle, edge.target_handle
    )
}

/// State shared between the run driver, node invocations, and lazy pulls.
pub struct RunShared {
    pub(crate) run_id: RunId,
    pub(crate) definition: Arc<FlowDefinition>,
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) config: EngineConfig,
    pub(crate) provider: Arc<dyn ProviderAdapter>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cancel: CancellationToken,
    pub(crate) contexts: Mutex<ContextManager>,
    pub(crate) portal: Mutex<PortalRegistry>,
    pub(crate) cache: Arc<NodeCache>,
    pub(crate) staged: Mutex<HashMap<String, StagedInputs>>,
    pub(crate) pull_memo: Mutex<HashMap<String, NodeOutput>>,
    pub(crate) pull_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    pub(crate) retry_attempts: Mutex<HashMap<String, u32>>,
    pub(crate) outputs: Mutex<HashMap<String, NodeOutput>>,
    pub(crate) usage_input: AtomicU64,
    pub(crate) usage_output: AtomicU64,
    pub(crate) executions: AtomicUsize,
}

impl RunShared {
    /// Execute one node through the uniform protocol: resolve the active
    /// context, invoke the handler, reconcile the context output.
    ///
    /// Handler failures become `Error`-status outputs; only cancellation and
    /// the execution limit abort the run from here.
    pub(crate) fn execute_node(
        self: Arc<Self>,
        node_id: String,
        pushed: PushedInputs,
    ) -> BoxFuture<'static, Result<NodeOutput>> {
        Box::pin(async move {
            let count = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
            let limit = self.config.limits.max_node_executions;
            if count > limit {
                return Err(FlowError::ExecutionLimitExceeded(limit));
            }
            if self.cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            let node = self
                .definition
                .node(&node_id)
                .ok_or_else(|| FlowError::UnknownNode(node_id.clone()))?
                .clone();
            let handler = self
                .registry
                .get(node.kind)
                .ok_or_else(|| FlowError::UnknownNode(node.kind.to_string()))?;

            self.events.publish(FlowEvent::NodeStarted {
                node_id: node_id.clone(),
                kind: node.kind,
            });
            let start = Instant::now();

            let (active_id, active_value) = {
                let mut contexts = self.contexts.lock().await;
                let id = contexts.resolve_active(pushed.context.as_ref());
                let value = contexts.value(&id);
                (id, value)
            };

            let wired: HashMap<String, (String, String)> = self
                .definition
                .inbound(&node_id)
                .map(|e| {
                    (
                        e.target_handle.clone(),
                        (e.source.clone(), e.source_handle.clone()),
                    )
                })
                .collect();

            let invocation = NodeInvocation {
                node_id: node_id.clone(),
                config: node.config.clone(),
                context: active_value,
                pushed,
                inputs: NodeInputs::new(self.clone(), node_id.as_str(), wired),
            };
            let api = FlowApi::new(self.clone(), node_id.as_str());

            let mut output = match handler.execute(&api, invocation).await {
                Ok(output) => output,
                Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
                Err(e @ FlowError::ExecutionLimitExceeded(_)) => return Err(e),
                Err(e) => {
                    error!(node_id = %node_id, error = %e, "Node execution failed");
                    NodeOutput::error(e.to_string())
                }
            };

            {
                let mut contexts = self.contexts.lock().await;
                let final_id = contexts.ensure_output(output.context.take(), &active_id).await;
                output.context = Some(contexts.value(&final_id));
            }

            let elapsed_ms = start.elapsed().as_millis() as u64;
            self.events.publish(FlowEvent::NodeFinished {
                node_id: node_id.clone(),
                status: output.status.as_str().to_string(),
                elapsed_ms,
            });
            debug!(
                node_id = %node_id,
                status = output.status.as_str(),
                elapsed_ms,
                "Node execution complete"
            );

            self.outputs
                .lock()
                .await
                .insert(node_id.clone(), output.clone());
            Ok(output)
        })
    }

    /// Resolve a lazy pull of `node_id`, executing it on demand under its
    /// pull lock and memoizing the result for the remainder of the round.
    pub(crate) async fn pull_output(self: &Arc<Self>, node_id: &str, fresh: bool) -> Result<NodeOutput> {
        let lock = {
            let mut locks = self.pull_locks.lock().await;
            locks
                .entry(node_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        if fresh {
            self.pull_memo.lock().await.remove(node_id);
        } else if let Some(hit) = self.pull_memo.lock().await.get(node_id).cloned() {
            return Ok(hit);
        }

        // Pulls observe staged pushes without consuming them.
        let pushed = {
            let staged = self.staged.lock().await;
            staged
                .get(node_id)
                .map(|s| PushedInputs {
                    context: s.context.clone(),
                    ports: s.ports.clone(),
                    resume: None,
                })
                .unwrap_or_default()
        };

        let output = self.clone().execute_node(node_id.to_string(), pushed).await?;
        self.pull_memo
            .lock()
            .await
            .insert(node_id.to_string(), output.clone());
        Ok(output)
    }
}

/// Walks a flow definition, deciding push/pull evaluation per node policy.
///
/// Construction validates the graph once: structure, known kinds, and
/// acyclicity of the edge set (loop-backs go through portals, which are
/// edge-free by design).
pub struct Scheduler {
    definition: Arc<FlowDefinition>,
    registry: Arc<NodeRegistry>,
    services: EngineServices,
    config: EngineConfig,
    topo_index: HashMap<String, usize>,
    /// Node cache is scoped to the flow instance, not a single run, so a
    /// re-fed flow can hit entries from an earlier run.
    cache: Arc<NodeCache>,
}

impl Scheduler {
    pub fn new(
        definition: FlowDefinition,
        registry: NodeRegistry,
        services: EngineServices,
        config: EngineConfig,
    ) -> Result<Self> {
        definition.validate()?;
        for node in &definition.nodes {
            if registry.get(node.kind).is_none() {
                return Err(FlowError::UnknownNode(node.kind.to_string()));
            }
        }
        let topo_index = topological_index(&definition)?;
        let cache = Arc::new(NodeCache::new(services.cache_store.clone()));
        Ok(Self {
            definition: Arc::new(definition),
            registry: Arc::new(registry),
            services,
            config,
            topo_index,
            cache,
        })
    }

    /// Begin a run against an initial context. The run is driven by
    /// `FlowRun::run` and may be resumed or cancelled from there.
    pub fn start(&self, initial_context: FlowContext) -> FlowRun {
        let services = self.services.clone();
        let contexts = ContextManager::new(
            initial_context,
            services.sink.clone(),
            self.config.presentation.clone(),
        );
        let shared = Arc::new(RunShared {
            run_id: RunId::new(),
            definition: self.definition.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            provider: services.provider,
            tools: services.tools,
            events: services.events,
            clock: services.clock,
            cancel: CancellationToken::new(),
            contexts: Mutex::new(contexts),
            portal: Mutex::new(PortalRegistry::new()),
            cache: self.cache.clone(),
            staged: Mutex::new(HashMap::new()),
            pull_memo: Mutex::new(HashMap::new()),
            pull_locks: Mutex::new(HashMap::new()),
            retry_attempts: Mutex::new(HashMap::new()),
            outputs: Mutex::new(HashMap::new()),
            usage_input: AtomicU64::new(0),
            usage_output: AtomicU64::new(0),
            executions: AtomicUsize::new(0),
        });
        FlowRun {
            shared,
            topo_index: self.topo_index.clone(),
            dirty: VecDeque::new(),
            dirty_set: HashSet::new(),
            status: FlowStatus::Running,
            waiting: None,
        }
    }
}

/// Kahn's algorithm over the edge set; a cyclic edge set is a load error.
fn topological_index(definition: &FlowDefinition) -> Result<HashMap<String, usize>> {
    let mut in_degree: HashMap<&str, usize> = definition
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();
    for edge in &definition.edges {
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = definition
        .nodes
        .iter()
        .filter(|n| in_degree[n.id.as_str()] == 0)
        .map(|n| n.id.as_str())
        .collect();

    let mut index = HashMap::new();
    while let Some(id) = queue.pop_front() {
        index.insert(id.to_string(), index.len());
        for edge in definition.outbound(id) {
            if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(edge.target.as_str());
                }
            }
        }
    }

    if index.len() != definition.nodes.len() {
        return Err(FlowError::InvalidFlow(
            "edge set contains a cycle; use portals for loop-back topologies".to_string(),
        ));
    }
    Ok(index)
}

/// A node that paused the run, held until external resumption.
struct WaitingState {
    node_id: String,
    pushed: PushedInputs,
}

/// One cooperative scheduling domain: a single flow run.
pub struct FlowRun {
    shared: Arc<RunShared>,
    topo_index: HashMap<String, usize>,
    dirty: VecDeque<String>,
    dirty_set: HashSet<String>,
    status: FlowStatus,
    waiting: Option<WaitingState>,
}

impl FlowRun {
    pub fn run_id(&self) -> RunId {
        self.shared.run_id.clone()
    }

    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// Request cooperative cancellation; node bodies abort at their next
    /// suspension point.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Accumulated (input, output) token usage.
    pub fn usage(&self) -> (u64, u64) {
        (
            self.shared.usage_input.load(Ordering::Relaxed),
            self.shared.usage_output.load(Ordering::Relaxed),
        )
    }

    /// The live main context.
    pub async fn main_context(&self) -> FlowContext {
        self.shared.contexts.lock().await.main_context()
    }

    /// The most recent output of a node in this run, as surfaced to the UI.
    pub async fn node_output(&self, node_id: &str) -> Option<NodeOutput> {
        self.shared.outputs.lock().await.get(node_id).cloned()
    }

    /// Execute the flow from its entry nodes with an initial data push.
    ///
    /// Returns `Stopped` on completion, or `WaitingForInput` if a gate
    /// paused the run; continue with [`FlowRun::resume`].
    pub async fn run(&mut self, initial_data: serde_json::Value) -> Result<FlowStatus> {
        self.shared.events.publish(FlowEvent::RunStarted {
            run_id: self.shared.run_id.clone(),
        });
        self.set_status(FlowStatus::Running);
        info!(run_id = %self.shared.run_id, flow = %self.shared.definition.id, "Flow run started");

        self.seed_entries(initial_data).await;
        self.drive().await
    }

    /// Resume a run paused by a `Waiting` node, re-executing that node with
    /// the external payload.
    pub async fn resume(&mut self, input: serde_json::Value) -> Result<FlowStatus> {
        let Some(WaitingState { node_id, mut pushed }) = self.waiting.take() else {
            return Err(FlowError::NotWaiting);
        };
        debug!(node_id = %node_id, "Resuming flow run");
        self.set_status(FlowStatus::Running);
        pushed.resume = Some(input);

        let result = self
            .shared
            .clone()
            .execute_node(node_id.clone(), pushed.clone())
            .await;
        match self.settle(node_id, pushed, result).await? {
            Some(state) => {
                self.waiting = Some(state);
                self.set_status(FlowStatus::WaitingForInput);
                Ok(FlowStatus::WaitingForInput)
            }
            None => self.drive().await,
        }
    }

    async fn seed_entries(&mut self, initial_data: serde_json::Value) {
        let entries: Vec<String> = self
            .shared
            .definition
            .nodes
            .iter()
            .filter(|n| {
                let pull_only = self
                    .shared
                    .registry
                    .get(n.kind)
                    .map(|h| h.pull_only())
                    .unwrap_or(false);
                !pull_only && self.shared.definition.inbound(&n.id).next().is_none()
            })
            .map(|n| n.id.clone())
            .collect();

        {
            let mut staged = self.shared.staged.lock().await;
            for id in &entries {
                let entry = staged.entry(id.clone()).or_default();
                entry.ports.insert(
                    loomflow_core::flow::DATA_PORT.to_string(),
                    PortPayload::Value(initial_data.clone()),
                );
                entry.delivered.insert("__initial__".to_string());
            }
        }
        for id in entries {
            self.mark_dirty(id);
        }
    }

    /// Main loop: gather gated-ready nodes, execute them concurrently,
    /// fan out their outputs, repeat until quiescent.
    async fn drive(&mut self) -> Result<FlowStatus> {
        loop {
            if self.shared.cancel.is_cancelled() {
                return self.fail(FlowError::Cancelled).await;
            }

            let batch = self.collect_ready().await;
            if batch.is_empty() {
                return self.complete().await;
            }

            // Pull memoization lasts one round.
            self.shared.pull_memo.lock().await.clear();

            let futures: Vec<_> = batch
                .iter()
                .map(|(id, pushed)| self.shared.clone().execute_node(id.clone(), pushed.clone()))
                .collect();
            let results = join_all(futures).await;

            // Fan out successes before honoring a pause, so concurrent
            // branch results from this round are not lost. A second waiting
            // node in the same round is re-staged; it pauses the run again
            // once the first is resumed.
            let mut paused: Option<WaitingState> = None;
            for ((node_id, pushed), result) in batch.into_iter().zip(results) {
                match self.settle(node_id, pushed, result).await? {
                    Some(state) if paused.is_none() => paused = Some(state),
                    Some(state) => self.restage(state).await,
                    None => {}
                }
            }
            if let Some(state) = paused {
                info!(node_id = %state.node_id, "Flow waiting for external input");
                self.waiting = Some(state);
                self.set_status(FlowStatus::WaitingForInput);
                return Ok(FlowStatus::WaitingForInput);
            }
        }
    }

    /// Apply one node result to the run: fan out success, route or fail on
    /// error. A `Waiting` result is handed back for the caller to suspend
    /// on; run-fatal errors propagate after teardown.
    async fn settle(
        &mut self,
        node_id: String,
        pushed: PushedInputs,
        result: Result<NodeOutput>,
    ) -> Result<Option<WaitingState>> {
        let output = match result {
            Ok(output) => output,
            Err(e) => return self.fail(e).await.map(|_| None),
        };
        match output.status {
            NodeStatus::Success => {
                self.fan_out(&node_id, &output).await;
                Ok(None)
            }
            NodeStatus::Waiting => Ok(Some(WaitingState { node_id, pushed })),
            NodeStatus::Error => {
                let message = output
                    .error
                    .clone()
                    .unwrap_or_else(|| "node failed".to_string());
                if self.route_error(&node_id, &message).await {
                    Ok(None)
                } else {
                    self.fail(FlowError::NodeExecution {
                        node: node_id,
                        message,
                    })
                    .await
                    .map(|_| None)
                }
            }
        }
    }

    async fn collect_ready(&mut self) -> Vec<(String, PushedInputs)> {
        let mut ready = Vec::new();
        let candidates: Vec<String> = self.dirty.drain(..).collect();
        self.dirty_set.clear();

        let mut staged = self.shared.staged.lock().await;
        for node_id in candidates {
            let Some(node) = self.shared.definition.node(&node_id) else {
                continue;
            };
            let Some(handler) = self.shared.registry.get(node.kind) else {
                continue;
            };
            if handler.pull_only() {
                continue;
            }

            let satisfied = match staged.get(&node_id) {
                None => false,
                Some(inputs) => match handler.policy() {
                    crate::protocol::ExecutionPolicy::Any => !inputs.delivered.is_empty(),
                    crate::protocol::ExecutionPolicy::All => self
                        .shared
                        .definition
                        .inbound(&node_id)
                        .all(|e| inputs.delivered.contains(&edge_key(e))),
                },
            };
            if !satisfied {
                continue;
            }

            let inputs = staged.remove(&node_id).unwrap_or_default();
            ready.push((
                node_id,
                PushedInputs {
                    context: inputs.context,
                    ports: inputs.ports,
                    resume: None,
                },
            ));
        }
        drop(staged);

        ready.sort_by_key(|(id, _)| self.topo_index.get(id).copied().unwrap_or(usize::MAX));
        ready
    }

    async fn fan_out(&mut self, node_id: &str, output: &NodeOutput) {
        let edges: Vec<FlowEdge> = self
            .shared
            .definition
            .outbound(node_id)
            .cloned()
            .collect();
        let mut targets = Vec::new();

        {
            let mut staged = self.shared.staged.lock().await;
            for edge in &edges {
                let payload = if edge.is_context() {
                    None
                } else if let Some(route) = &output.metadata.route {
                    if route != &edge.source_handle {
                        continue;
                    }
                    Some(PortPayload::Value(
                        output.data.clone().unwrap_or(serde_json::Value::Null),
                    ))
                } else if let Some(tools) = &output.tools {
                    Some(PortPayload::Value(
                        serde_json::to_value(tools).unwrap_or(serde_json::Value::Null),
                    ))
                } else {
                    Some(PortPayload::Value(
                        output.data.clone().unwrap_or(serde_json::Value::Null),
                    ))
                };

                let entry = staged.entry(edge.target.clone()).or_default();
                if edge.is_context() {
                    entry.context = output.context.clone();
                } else if let Some(payload) = payload {
                    entry.ports.insert(edge.target_handle.clone(), payload);
                }
                entry.delivered.insert(edge_key(edge));
                targets.push(edge.target.clone());
            }
        }

        for target in targets {
            self.mark_dirty(target);
        }
    }

    /// Deliver an error to wired error-aware consumers. Returns false when
    /// none exist and the run must stop.
    async fn route_error(&mut self, node_id: &str, message: &str) -> bool {
        let edges: Vec<FlowEdge> = self
            .shared
            .definition
            .outbound(node_id)
            .filter(|e| !e.is_context())
            .filter(|e| {
                self.shared
                    .definition
                    .node(&e.target)
                    .map(|n| {
                        matches!(n.kind, NodeKind::ErrorDetection | NodeKind::RetryWithBackoff)
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if edges.is_empty() {
            return false;
        }

        let mut targets = Vec::new();
        {
            let mut staged = self.shared.staged.lock().await;
            for edge in &edges {
                let entry = staged.entry(edge.target.clone()).or_default();
                entry.ports.insert(
                    edge.target_handle.clone(),
                    PortPayload::Failure(message.to_string()),
                );
                entry.delivered.insert(edge_key(edge));
                targets.push(edge.target.clone());
            }
        }
        warn!(node_id = %node_id, error = %message, "Node error routed to error-aware consumers");
        for target in targets {
            self.mark_dirty(target);
        }
        true
    }

    /// Put a node's consumed inputs back so it fires again in a later
    /// round.
    async fn restage(&mut self, state: WaitingState) {
        {
            let mut staged = self.shared.staged.lock().await;
            let entry = staged.entry(state.node_id.clone()).or_default();
            entry.context = state.pushed.context;
            entry.ports.extend(state.pushed.ports);
            entry.delivered.insert("__restaged__".to_string());
        }
        self.mark_dirty(state.node_id);
    }

    fn mark_dirty(&mut self, node_id: String) {
        if self.dirty_set.insert(node_id.clone()) {
            self.dirty.push_back(node_id);
        }
    }

    fn set_status(&mut self, status: FlowStatus) {
        if self.status != status {
            self.status = status;
            self.shared.events.publish(FlowEvent::StatusChanged(status));
        }
    }

    async fn complete(&mut self) -> Result<FlowStatus> {
        self.teardown().await;
        self.set_status(FlowStatus::Stopped);
        self.shared.events.publish(FlowEvent::RunComplete {
            run_id: self.shared.run_id.clone(),
        });
        info!(run_id = %self.shared.run_id, "Flow run complete");
        Ok(FlowStatus::Stopped)
    }

    async fn fail(&mut self, error: FlowError) -> Result<FlowStatus> {
        self.teardown().await;
        self.set_status(FlowStatus::Stopped);
        self.shared.events.publish(FlowEvent::RunError {
            error: error.to_string(),
        });
        error!(run_id = %self.shared.run_id, error = %error, "Flow run failed");
        Err(error)
    }

    async fn teardown(&mut self) {
        self.shared.portal.lock().await.clear();
        self.shared.contexts.lock().await.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomflow_core::flow::FlowNode;

    fn linear_definition() -> FlowDefinition {
        FlowDefinition::new(
            "f",
            vec![
                FlowNode::new("a", NodeKind::ChatInput),
                FlowNode::new("b", NodeKind::ParallelSplit),
                FlowNode::new("c", NodeKind::ParallelJoin),
            ],
            vec![FlowEdge::data("a", "b"), FlowEdge::data("b", "c")],
        )
    }

    #[test]
    fn topological_index_orders_downstream_later() {
        let index = topological_index(&linear_definition()).unwrap();
        assert!(index["a"] < index["b"]);
        assert!(index["b"] < index["c"]);
    }

    #[test]
    fn topological_index_rejects_cycles() {
        let def = FlowDefinition::new(
            "f",
            vec![
                FlowNode::new("a", NodeKind::ParallelSplit),
                FlowNode::new("b", NodeKind::ParallelSplit),
            ],
            vec![FlowEdge::data("a", "b"), FlowEdge::data("b", "a")],
        );
        assert!(matches!(
            topological_index(&def),
            Err(FlowError::InvalidFlow(_))
        ));
    }

    #[test]
    fn edge_key_distinguishes_handles() {
        let e1 = FlowEdge::ports("a", "out-1", "b", "data");
        let e2 = FlowEdge::ports("a", "out-2", "b", "data");
        assert_ne!(edge_key(&e1), edge_key(&e2));
    }
}
