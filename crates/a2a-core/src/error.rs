use thiserror::Error;

/// Error taxonomy shared by storage, the task manager, the queue/processor,
/// and the agent execution loop.
///
/// One kind per failure category: validation / not_found / conflict /
/// backend_unavailable / tool_failure / iteration_exhausted / canceled /
/// queue_full / internal.
#[derive(Debug, Error)]
pub enum A2aError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("tool execution failed: {0}")]
    ToolFailure(String),

    #[error("{0}")]
    IterationExhausted(String),

    #[error("task canceled")]
    Canceled,

    #[error("Task queue is full. Please try again later.")]
    QueueFull,

    #[error("{0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl A2aError {
    /// Illegal state-machine transition — a specific flavor of `Validation`.
    pub fn illegal_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        A2aError::Validation(format!("illegal transition: {from} -> {to}"))
    }

    /// Short error code string, used in JSON-RPC error data and logs.
    pub fn code(&self) -> &'static str {
        match self {
            A2aError::Validation(_) => "validation",
            A2aError::NotFound(_) => "not_found",
            A2aError::Conflict(_) => "conflict",
            A2aError::BackendUnavailable(_) => "backend_unavailable",
            A2aError::ToolFailure(_) => "tool_failure",
            A2aError::IterationExhausted(_) => "iteration_exhausted",
            A2aError::Canceled => "canceled",
            A2aError::QueueFull => "queue_full",
            A2aError::Internal(_) => "internal",
            A2aError::Config(_) => "config",
            A2aError::Serialization(_) => "internal",
        }
    }

    /// JSON-RPC 2.0 error code for this error, per the ranges in §6.
    pub fn rpc_code(&self) -> i64 {
        match self {
            A2aError::Validation(_) => -32602,
            A2aError::NotFound(_) => -32001,
            A2aError::Conflict(_) => -32002,
            A2aError::BackendUnavailable(_) => -32003,
            A2aError::ToolFailure(_) => -32000,
            A2aError::IterationExhausted(_) => -32000,
            A2aError::Canceled => -32000,
            A2aError::QueueFull => -32004,
            A2aError::Internal(_) => -32603,
            A2aError::Config(_) => -32603,
            A2aError::Serialization(_) => -32700,
        }
    }
}

pub type Result<T> = std::result::Result<T, A2aError>;
