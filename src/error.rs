use thiserror::Error;

/// Convenience type alias for `Result`s that carry an [`OrchestratorError`].
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Error taxonomy for the orchestration engine.
///
/// Each variant maps onto one of the error kinds in the design's propagation
/// policy: configuration errors fail `Start` synchronously, provider/tool
/// errors either recover locally (coaching feedback) or escalate to the
/// owning task, and `Cancelled` never surfaces as a task-level error.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("tool invocation error: {tool} - {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("malformed llm output: {0}")]
    MalformedLlmOutput(String),

    #[error("iteration limit exceeded after {iterations} iterations")]
    IterationLimitExceeded { iterations: u32 },

    #[error("task {task_id} blocked: {reason}")]
    TaskBlocked { task_id: String, reason: String },

    #[error("sub-workflow failure: {0}")]
    SubWorkflowFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Whether this error should escalate and fail the owning task outright,
    /// as opposed to being recovered locally as coaching feedback inside the
    /// ReAct loop.
    pub fn is_fatal_to_task(&self) -> bool {
        matches!(
            self,
            OrchestratorError::LlmProvider(_)
                | OrchestratorError::IterationLimitExceeded { .. }
                | OrchestratorError::SubWorkflowFailure(_)
                | OrchestratorError::Configuration(_)
        )
    }
}
