use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use loomflow_core::error::{FlowError, Result};
use loomflow_core::event::FlowEvent;
use loomflow_core::flow::NodeKind;
use loomflow_core::types::{ChatMessage, StreamDelta, StreamRequest};

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Drives a streaming provider request against the active context.
///
/// Tools are pulled lazily from a wired `tools` port, so the tools provider
/// node only runs when an LLM node actually needs it. The assistant reply is
/// appended to the context; deltas stream out as events while the node is
/// suspended on provider I/O.
pub struct LlmRequestNode;

impl NodeHandler for LlmRequestNode {
    fn kind(&self) -> NodeKind {
        NodeKind::LlmRequest
    }

    fn execute<'a>(
        &'a self,
        api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let tools = if invocation.inputs.has("tools") {
                invocation.inputs.pull_tools("tools").await?
            } else {
                Vec::new()
            };

            let context = invocation.context;
            let request = StreamRequest::from_context(&context, tools);
            debug!(
                node_id = %invocation.node_id,
                provider = %request.provider,
                model = %request.model,
                messages = request.messages.len(),
                "Starting provider stream"
            );

            let cancel = api.cancel_token();
            let provider = api.provider();
            let stream_result = tokio::select! {
                result = provider.agent_stream(request) => result,
                _ = cancel.cancelled() => return Err(FlowError::Cancelled),
            };
            let mut stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => return Ok(NodeOutput::error(e.to_string())),
            };

            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err(FlowError::Cancelled);
                }
                match delta {
                    Ok(StreamDelta::TextDelta(chunk)) => {
                        api.publish(FlowEvent::TextDelta(chunk.clone()));
                        text.push_str(&chunk);
                    }
                    Ok(StreamDelta::ToolStart { name, input }) => {
                        api.publish(FlowEvent::ToolStart { name, input });
                    }
                    Ok(StreamDelta::ToolEnd { name, is_error }) => {
                        api.publish(FlowEvent::ToolEnd { name, is_error });
                    }
                    Ok(StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    }) => {
                        api.record_usage(input_tokens, output_tokens);
                        api.publish(FlowEvent::UsageUpdate {
                            input_tokens,
                            output_tokens,
                        });
                    }
                    Ok(StreamDelta::Stop) => break,
                    Err(e) => {
                        warn!(node_id = %invocation.node_id, error = %e, "Provider stream failed");
                        return Ok(NodeOutput::error(e.to_string()));
                    }
                }
            }

            let next = context.with_message(ChatMessage::assistant_text(&text));
            Ok(NodeOutput::success()
                .with_context(next)
                .with_data(serde_json::Value::String(text)))
        })
    }
}
