use futures::future::BoxFuture;

use loomflow_core::error::Result;
use loomflow_core::flow::NodeKind;
use loomflow_core::types::ChatMessage;

use crate::api::FlowApi;
use crate::protocol::{NodeHandler, NodeInvocation, NodeOutput};

/// Entry node: appends the pushed user message to the active context and
/// forwards both.
pub struct ChatInputNode;

impl ChatInputNode {
    fn message_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            other => other.to_string(),
        }
    }
}

impl NodeHandler for ChatInputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ChatInput
    }

    fn execute<'a>(
        &'a self,
        _api: &'a FlowApi,
        invocation: NodeInvocation,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let pushed = invocation.pushed.data().unwrap_or(serde_json::Value::Null);
            let text = match &pushed {
                serde_json::Value::Null => invocation
                    .config
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                other => Self::message_text(other),
            };

            let context = invocation.context.with_message(ChatMessage::user(&text));
            Ok(NodeOutput::success()
                .with_context(context)
                .with_data(serde_json::Value::String(text)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_from_shapes() {
        assert_eq!(
            ChatInputNode::message_text(&serde_json::json!("hi")),
            "hi"
        );
        assert_eq!(
            ChatInputNode::message_text(&serde_json::json!({"message": "hello"})),
            "hello"
        );
        assert_eq!(ChatInputNode::message_text(&serde_json::json!(7)), "7");
    }
}
