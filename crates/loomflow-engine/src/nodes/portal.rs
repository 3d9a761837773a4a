use futures::future::BoxFuture;
use tracing::debug;

use loomflow_core::error::Result;
use loomflow_core::flow::{NodeKind, CONTEXT_PORT};

use crate::api::FlowApi;
use crate::portal::PortalEntry;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

fn portal_id(config: &serde_json::Value) -> Option<String> {
    config
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Stores its incoming context/data under a user-assigned portal id,
/// overwriting any previous entry for that id, then passes through.
pub struct PortalInputNode;

impl NodeHandler for PortalInputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::PortalInput
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(id) = portal_id(&invocation.config) else {
                return Ok(NodeOutput::error("portal node is missing an id"));
            };

            let context = invocation
                .pushed
                .context
                .clone()
                .unwrap_or_else(|| invocation.context.clone());
            let data = invocation.pushed.data();
            debug!(node_id = %invocation.node_id, portal = %id, "Portal entry stored");
            api.portal_set(
                &id,
                PortalEntry {
                    context: Some(context),
                    data: data.clone(),
                },
            )
            .await;

            let mut output = NodeOutput::success();
            if let Some(data) = data {
                output = output.with_data(data);
            }
            Ok(output)
        })
    }
}

/// Pull-only other half of a portal pair.
///
/// A registry miss (first loop iteration, or the input half has not run)
/// passes through whatever context was pushed or is pullable on its own
/// ports; a hit prefers the stored context. Never emits data — portals are
/// a context-only relay on their output side.
pub struct PortalOutputNode;

impl NodeHandler for PortalOutputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::PortalOutput
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
            let Some(id) = portal_id(&invocation.config) else {
                return Ok(NodeOutput::error("portal node is missing an id"));
            };

            let local_context = match invocation.pushed.context.clone() {
                Some(context) => Some(context),
                None if invocation.inputs.has(CONTEXT_PORT) => {
                    invocation.inputs.pull_context(CONTEXT_PORT).await?
                }
                None => None,
            };

            let context = match api.portal_get(&id).await {
                Some(entry) => {
                    debug!(node_id = %invocation.node_id, portal = %id, "Portal entry relayed");
                    entry.context.or(local_context)
                }
                None => {
                    debug!(node_id = %invocation.node_id, portal = %id, "Portal empty, passing through");
                    local_context
                }
            };

            let mut output = NodeOutput::success();
            if let Some(context) = context {
                output = output.with_context(context);
            }
            Ok(output)
        })
    }
}
