use std::collections::HashMap;
use std::sync::Arc;

use loomflow_core::traits::Tool;
use loomflow_core::types::ToolDefinition;

/// Registry of tools available to the flow's provider adapters.
///
/// The engine only lists definitions; execution happens inside the adapter.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Definitions for the named tools only; empty names means all.
    /// Unknown names are skipped.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        if names.is_empty() {
            return self.definitions();
        }
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use loomflow_core::error::Result;
    use loomflow_core::types::{ToolCallContext, ToolResult};

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        fn execute(
            &self,
            input: serde_json::Value,
            _ctx: ToolCallContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async move { Ok(ToolResult::success(input.to_string())) })
        }
    }

    #[test]
    fn register_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert_eq!(registry.list(), vec!["echo"]);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn definitions_for_filters_and_skips_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let defs = registry.definitions_for(&["echo".into(), "missing".into()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");

        let all = registry.definitions_for(&[]);
        assert_eq!(all.len(), 1);
    }
}
