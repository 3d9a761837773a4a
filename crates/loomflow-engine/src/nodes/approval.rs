use futures::future::BoxFuture;
use tracing::info;

use loomflow_core::error::Result;
use loomflow_core::event::FlowEvent;
use loomflow_core::flow::NodeKind;

use crate::api::FlowApi;
use crate::nodes::resume_approved;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Pauses the run until an external approval decision arrives.
///
/// First execution returns `Waiting`; resumption with an approval passes
/// the gated value through, a denial becomes a node error.
pub struct ApprovalGateNode;

impl NodeHandler for ApprovalGateNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ApprovalGate
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            if let Some(decision) = &invocation.pushed.resume {
                return if resume_approved(decision) {
                    info!(node_id = %invocation.node_id, "Approval granted");
                    Ok(NodeOutput::success()
                        .with_data(invocation.pushed.data().unwrap_or(serde_json::Value::Null)))
                } else {
                    Ok(NodeOutput::error("approval denied"))
                };
            }

            let summary = invocation
                .config
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or("approval required")
                .to_string();
            api.publish(FlowEvent::ApprovalRequested {
                node_id: invocation.node_id.clone(),
                summary,
            });
            Ok(NodeOutput::waiting())
        })
    }
}
