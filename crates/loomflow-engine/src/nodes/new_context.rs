use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::NodeKind;
use loomflow_core::types::ChatMessage;

use crate::api::FlowApi;
use crate::context::IsolatedOptions;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Spawns an isolated context for a branch.
///
/// Provider, model, instructions, and any seed history come from node
/// config only — nothing is inherited from the active context.
pub struct NewContextNode;

impl NodeHandler for NewContextNode {
    fn kind(&self) -> NodeKind {
        NodeKind::NewContext
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let config = &invocation.config;
            let Some(provider) = config.get("provider").and_then(|v| v.as_str()) else {
                return Ok(NodeOutput::error("newContext node is missing a provider"));
            };
            let Some(model) = config.get("model").and_then(|v| v.as_str()) else {
                return Ok(NodeOutput::error("newContext node is missing a model"));
            };

            let history: Vec<ChatMessage> = config
                .get("history")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .unwrap_or_default()
                .unwrap_or_default();

            let options = IsolatedOptions {
                provider: provider.to_string(),
                model: model.to_string(),
                system_instructions: config
                    .get("systemInstructions")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                temperature: config
                    .get("temperature")
                    .and_then(|v| v.as_f64())
                    .map(|t| t as f32),
                reasoning_effort: config
                    .get("reasoningEffort")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                history,
            };

            let isolated = api.create_isolated(options).await;
            let mut output = NodeOutput::success().with_context(isolated);
            if let Some(data) = invocation.pushed.data() {
                output = output.with_data(data);
            }
            Ok(output)
        })
    }
}
