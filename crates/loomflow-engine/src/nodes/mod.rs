//! Built-in node implementations, one type per file, all registered by
//! [`crate::protocol::NodeRegistry::with_builtins`].

pub mod approval;
pub mod budget;
pub mod cache;
pub mod chat_input;
pub mod conditional;
pub mod error_detection;
pub mod llm_request;
pub mod new_context;
pub mod parallel;
pub mod portal;
pub mod retry;
pub mod tools;

pub use approval::ApprovalGateNode;
pub use budget::BudgetGuardNode;
pub use cache::CacheNode;
pub use chat_input::ChatInputNode;
pub use conditional::ConditionalNode;
pub use error_detection::ErrorDetectionNode;
pub use llm_request::LlmRequestNode;
pub use new_context::NewContextNode;
pub use parallel::{ParallelJoinNode, ParallelSplitNode};
pub use portal::{PortalInputNode, PortalOutputNode};
pub use retry::RetryWithBackoffNode;
pub use tools::ToolsNode;

/// Read an approve/deny decision from a resumption payload.
///
/// Accepts a bare boolean or `{"approved": bool}`; anything else denies.
pub(crate) fn resume_approved(payload: &serde_json::Value) -> bool {
    payload
        .as_bool()
        .or_else(|| payload.get("approved").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::resume_approved;

    #[test]
    fn resume_payload_shapes() {
        assert!(resume_approved(&serde_json::json!(true)));
        assert!(resume_approved(&serde_json::json!({"approved": true})));
        assert!(!resume_approved(&serde_json::json!(false)));
        assert!(!resume_approved(&serde_json::json!({"approved": false})));
        assert!(!resume_approved(&serde_json::json!("yes")));
    }
}
