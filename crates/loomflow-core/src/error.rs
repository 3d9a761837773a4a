use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Graph / configuration errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Flow definition invalid: {0}")]
    InvalidFlow(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    // Node execution errors
    #[error("Node '{node}' failed: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Node '{node}' has no input wired to port '{port}'")]
    MissingInput { node: String, port: String },

    // Collaborator errors
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Provider stream error: {0}")]
    ProviderStream(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    // Run lifecycle errors
    #[error("Flow run cancelled")]
    Cancelled,

    #[error("Flow exceeded max node executions ({0})")]
    ExecutionLimitExceeded(usize),

    #[error("Flow run is not waiting for input")]
    NotWaiting,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
