pub mod api;
pub mod cache;
pub mod context;
pub mod nodes;
pub mod portal;
pub mod protocol;
pub mod scheduler;
pub mod tools;

pub use api::FlowApi;
pub use cache::{Clock, NodeCache, WallClock};
pub use context::{ContextManager, IsolatedOptions};
pub use portal::{PortalEntry, PortalRegistry};
pub use protocol::{
    ExecutionPolicy, NodeHandler, NodeInputs, NodeInvocation, NodeOutput, NodeRegistry,
    NodeStatus, OutputMetadata, PortPayload, PushedInputs,
};
pub use scheduler::{EngineServices, FlowRun, Scheduler};
pub use tools::ToolRegistry;
