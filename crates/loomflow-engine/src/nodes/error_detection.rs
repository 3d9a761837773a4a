use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::NodeKind;

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Branches on upstream error status: normal values route to `out-1`,
/// delivered failures route `{error}` to `out-2` so a flow can recover
/// instead of stopping.
pub struct ErrorDetectionNode;

impl NodeHandler for ErrorDetectionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ErrorDetection
    }

    fn execute<'a>(
        &'a self,
        _api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            if let Some(message) = invocation.pushed.first_failure() {
                return Ok(NodeOutput::success()
                    .with_data(serde_json::json!({ "error": message }))
                    .with_route("out-2"));
            }
            Ok(NodeOutput::success()
                .with_data(invocation.pushed.data().unwrap_or(serde_json::Value::Null))
                .with_route("out-1"))
        })
    }
}
