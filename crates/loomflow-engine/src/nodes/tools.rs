use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::NodeKind;

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Pull-only tools provider: resolves configured tool names against the
/// registry when a downstream consumer asks for them. Never auto-executes
/// from a push.
pub struct ToolsNode;

impl NodeHandler for ToolsNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Tools
    }

    fn pull_only(&self) -> bool {
        true
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let names: Vec<String> = invocation
                .config
                .get("tools")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            Ok(NodeOutput::success().with_tools(api.list_tools(&names)))
        })
    }
}
