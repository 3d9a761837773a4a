use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a logical conversation context.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a flow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a context is the main conversation or an isolated branch.
/// Set once at creation, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Main,
    Isolated,
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Isolated => write!(f, "isolated"),
        }
    }
}

/// The conversational state threaded through the node graph.
///
/// A context is a value that nodes may structurally replace (a node returns a
/// new context record); `message_history` is append-only by convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub context_id: ContextId,
    pub context_type: ContextType,
    pub provider: String,
    pub model: String,
    pub system_instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub message_history: Vec<ChatMessage>,
}

impl FlowContext {
    /// Create a main context with a fresh id and empty history.
    pub fn main(
        provider: impl Into<String>,
        model: impl Into<String>,
        system_instructions: impl Into<String>,
    ) -> Self {
        Self {
            context_id: ContextId::new(),
            context_type: ContextType::Main,
            provider: provider.into(),
            model: model.into(),
            system_instructions: system_instructions.into(),
            temperature: None,
            reasoning_effort: None,
            message_history: Vec::new(),
        }
    }

    /// Return a copy with `message` appended to the history.
    pub fn with_message(&self, message: ChatMessage) -> Self {
        let mut next = self.clone();
        next.message_history.push(message);
        next
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Tool definition for sending to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Identity of the tool invocation, passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub run_id: RunId,
    pub node_id: String,
}

/// A streaming delta from the provider adapter.
///
/// The adapter executes tool calls itself and surfaces them as
/// `ToolStart`/`ToolEnd`; the stream ends after `Stop` or an error item.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of assistant text.
    TextDelta(String),

    /// Tool execution started inside the adapter.
    ToolStart { name: String, input: serde_json::Value },

    /// Tool execution completed inside the adapter.
    ToolEnd { name: String, is_error: bool },

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// The response is complete.
    Stop,
}

/// Request driven through a provider adapter by the LLM node.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub provider: String,
    pub model: String,
    pub system_instructions: String,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl StreamRequest {
    /// Build a request from a context and the tools wired to the node.
    pub fn from_context(context: &FlowContext, tools: Vec<ToolDefinition>) -> Self {
        Self {
            provider: context.provider.clone(),
            model: context.model.clone(),
            system_instructions: context.system_instructions.clone(),
            temperature: context.temperature,
            reasoning_effort: context.reasoning_effort.clone(),
            messages: context.message_history.clone(),
            tools,
        }
    }
}

/// Snapshot of all live contexts in a run, published to the presentation sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub main_context: FlowContext,
    #[serde(default)]
    pub isolated_contexts: HashMap<ContextId, FlowContext>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_unique() {
        assert_ne!(ContextId::new(), ContextId::new());
    }

    #[test]
    fn with_message_appends_without_mutating_original() {
        let ctx = FlowContext::main("anthropic", "claude-sonnet-4", "be brief");
        let next = ctx.with_message(ChatMessage::user("hi"));

        assert!(ctx.message_history.is_empty());
        assert_eq!(next.message_history.len(), 1);
        assert_eq!(next.context_id, ctx.context_id);
    }

    #[test]
    fn message_text_joins_text_blocks() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text { text: "a".into() },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "grep".into(),
                    input: serde_json::json!({}),
                },
                ContentBlock::Text { text: "b".into() },
            ],
            timestamp: None,
        };
        assert_eq!(msg.text(), "ab");
    }

    #[test]
    fn stream_request_carries_context_settings() {
        let mut ctx = FlowContext::main("openai", "gpt-4o", "sys");
        ctx.temperature = Some(0.2);
        let req = StreamRequest::from_context(&ctx, vec![]);
        assert_eq!(req.provider, "openai");
        assert_eq!(req.temperature, Some(0.2));
        assert!(req.messages.is_empty());
    }

    #[test]
    fn context_serde_roundtrip() {
        let ctx = FlowContext::main("anthropic", "claude-sonnet-4", "sys");
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: FlowContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.context_id, ctx.context_id);
        assert_eq!(parsed.context_type, ContextType::Main);
    }
}
