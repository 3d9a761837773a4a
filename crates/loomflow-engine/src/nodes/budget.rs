use futures::future::BoxFuture;
use tracing::warn;

use loomflow_core::error::Result;
use loomflow_core::event::FlowEvent;
use loomflow_core::flow::NodeKind;

use crate::api::FlowApi;
use crate::nodes::resume_approved;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Gates on accumulated run token usage.
///
/// Under the configured budget the value passes straight through; over it
/// the run pauses for external confirmation, like the approval gate.
pub struct BudgetGuardNode;

impl NodeHandler for BudgetGuardNode {
    fn kind(&self) -> NodeKind {
        NodeKind::BudgetGuard
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(budget) = invocation.config.get("maxTokens").and_then(|v| v.as_u64())
            else {
                return Ok(NodeOutput::error("budgetGuard node is missing maxTokens"));
            };

            if let Some(decision) = &invocation.pushed.resume {
                return if resume_approved(decision) {
                    Ok(NodeOutput::success()
                        .with_data(invocation.pushed.data().unwrap_or(serde_json::Value::Null)))
                } else {
                    Ok(NodeOutput::error("budget overrun rejected"))
                };
            }

            let used = api.usage_total();
            if used <= budget {
                return Ok(NodeOutput::success()
                    .with_data(invocation.pushed.data().unwrap_or(serde_json::Value::Null)));
            }

            warn!(
                node_id = %invocation.node_id,
                used_tokens = used,
                budget_tokens = budget,
                "Token budget exceeded, pausing run"
            );
            api.publish(FlowEvent::BudgetAlert {
                node_id: invocation.node_id.clone(),
                used_tokens: used,
                budget_tokens: budget,
            });
            Ok(NodeOutput::waiting())
        })
    }
}
