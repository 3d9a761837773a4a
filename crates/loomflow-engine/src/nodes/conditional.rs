use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::{evaluate_condition, NodeKind};

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Routes its input to `out-1` or `out-2` by evaluating the configured
/// expression against the incoming data.
pub struct ConditionalNode;

impl NodeHandler for ConditionalNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    fn execute<'a>(
        &'a self,
        _api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(expr) = invocation
                .config
                .get("expression")
                .and_then(|v| v.as_str())
            else {
                return Ok(NodeOutput::error(
                    "conditional node is missing an expression",
                ));
            };

            let data = invocation.pushed.data().unwrap_or(serde_json::Value::Null);
            let route = if evaluate_condition(expr, &data) {
                "out-1"
            } else {
                "out-2"
            };
            Ok(NodeOutput::success().with_data(data).with_route(route))
        })
    }
}
