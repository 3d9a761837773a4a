use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::NodeKind;

use crate::api::FlowApi;
use crate::protocol::{
    ExecutionPolicy, NodeHandler, NodeInvocation, NodeOutput, PortPayload,
};

/// Fans one input out to N independent downstream branches.
pub struct ParallelSplitNode;

impl NodeHandler for ParallelSplitNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ParallelSplit
    }

    fn execute<'a>(
        &'a self,
        _api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            Ok(NodeOutput::success()
                .with_data(invocation.pushed.data().unwrap_or(serde_json::Value::Null)))
        })
    }
}

/// Blocks until every wired branch has delivered, then merges the branch
/// payloads into one object keyed by input port name.
pub struct ParallelJoinNode;

impl NodeHandler for ParallelJoinNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ParallelJoin
    }

    fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::All
    }

    fn execute<'a>(
        &'a self,
        _api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let mut merged = serde_json::Map::new();
            for (port, payload) in &invocation.pushed.ports {
                if let PortPayload::Value(value) = payload {
                    merged.insert(port.clone(), value.clone());
                }
            }
            Ok(NodeOutput::success().with_data(serde_json::Value::Object(merged)))
        })
    }
}
