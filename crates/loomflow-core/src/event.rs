use serde::{Deserialize, Serialize};

use crate::flow::NodeKind;
use crate::types::RunId;

/// Overall status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowStatus {
    Running,
    WaitingForInput,
    Stopped,
}

/// Flow event broadcast to all subscribers (UI, persistence, tests).
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Flow run started.
    RunStarted { run_id: RunId },
    /// A node began executing.
    NodeStarted { node_id: String, kind: NodeKind },
    /// A node finished (success, error, or waiting).
    NodeFinished {
        node_id: String,
        status: String,
        elapsed_ms: u64,
    },
    /// Assistant text streaming from the provider.
    TextDelta(String),
    /// Tool execution started inside the provider adapter.
    ToolStart { name: String, input: serde_json::Value },
    /// Tool execution completed inside the provider adapter.
    ToolEnd { name: String, is_error: bool },
    /// Flow-level status transition.
    StatusChanged(FlowStatus),
    /// A gate paused the run pending external approval.
    ApprovalRequested { node_id: String, summary: String },
    /// Budget guard tripped; the run pauses for confirmation.
    BudgetAlert {
        node_id: String,
        used_tokens: u64,
        budget_tokens: u64,
    },
    /// Token usage update from a provider stream.
    UsageUpdate {
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Flow run completed.
    RunComplete { run_id: RunId },
    /// Flow run failed.
    RunError { error: String },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(FlowEvent::TextDelta("hi".into()));

        match rx.recv().await.unwrap() {
            FlowEvent::TextDelta(text) => assert_eq!(text, "hi"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(FlowEvent::StatusChanged(FlowStatus::Running));
    }
}
