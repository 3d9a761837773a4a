use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Port name used for context edges; everything else is a data port.
pub const CONTEXT_PORT: &str = "context";

/// Default data port name.
pub const DATA_PORT: &str = "data";

/// The closed set of node kinds the engine can execute.
///
/// Unknown kinds are rejected when a definition is loaded, not at execution
/// time.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    ChatInput,
    LlmRequest,
    Tools,
    Cache,
    PortalInput,
    PortalOutput,
    NewContext,
    Conditional,
    ParallelSplit,
    ParallelJoin,
    ApprovalGate,
    BudgetGuard,
    RetryWithBackoff,
    ErrorDetection,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", s)
    }
}

/// A node in the flow graph.
///
/// `config` is the node's static configuration, validated lazily by the node
/// itself at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An edge connecting two node ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: String,
    #[serde(default = "default_data_handle")]
    pub source_handle: String,
    pub target: String,
    #[serde(default = "default_data_handle")]
    pub target_handle: String,
}

fn default_data_handle() -> String {
    DATA_PORT.to_string()
}

impl FlowEdge {
    /// Create a data edge between default data ports.
    pub fn data(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_handle: DATA_PORT.into(),
            target: target.into(),
            target_handle: DATA_PORT.into(),
        }
    }

    /// Create a context edge.
    pub fn context(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_handle: CONTEXT_PORT.into(),
            target: target.into(),
            target_handle: CONTEXT_PORT.into(),
        }
    }

    /// Create an edge with explicit handles.
    pub fn ports(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }

    /// Whether this edge carries context rather than data.
    pub fn is_context(&self) -> bool {
        self.source_handle == CONTEXT_PORT
    }
}

/// A user-authored flow graph. Immutable once loaded; edits create a new
/// definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

fn default_version() -> u32 {
    1
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            nodes,
            edges,
        }
    }

    /// Parse and validate a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: Self = serde_json::from_str(json)?;
        def.validate()?;
        Ok(def)
    }

    /// Structural validation: node ids unique, every edge endpoint present.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(FlowError::InvalidFlow(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(FlowError::InvalidFlow(format!(
                    "edge references unknown source '{}'",
                    edge.source
                )));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(FlowError::InvalidFlow(format!(
                    "edge references unknown target '{}'",
                    edge.target
                )));
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges arriving at `id`.
    pub fn inbound<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Edges leaving `id`.
    pub fn outbound<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }
}

/// Evaluate a routing expression against a node's incoming data.
///
/// Supported expressions:
/// - `key == "value"` — exact match
/// - `key != "value"` — not equal
/// - `key contains "substr"` — substring match
///
/// `key` is looked up in the data when it is a JSON object; the key `data`
/// addresses the value itself otherwise. Returns `false` for unparseable
/// expressions.
pub fn evaluate_condition(expr: &str, data: &serde_json::Value) -> bool {
    let expr = expr.trim();

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return lookup(data, key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return lookup(data, key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return lookup(data, key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == value);
    }

    false
}

fn lookup<'a>(data: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    match data {
        serde_json::Value::Object(map) => map.get(key),
        other if key == DATA_PORT => Some(other),
        _ => None,
    }
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let parts: Vec<&str> = expr.splitn(2, op).collect();
    if parts.len() != 2 {
        return None;
    }
    let key = parts[0].trim();
    let val = parts[1].trim().trim_matches('"');
    Some((key, val))
}
