//! Agent execution strategies.
//!
//! The teacher's `Agent` trait (`agents/mod.rs`) exposed `agent_type`,
//! `can_handle`, `execute`, and `analyze_task` for a fixed set of
//! domain-specific agents (`developer`, `project_manager`, ...). Here the
//! trait narrows to the one thing every agent kind actually needs —
//! executing a single task to completion or suspension — and the
//! domain-specific implementations are replaced by the two runtime
//! strategies the design calls for (§4.4, §4.5).

pub mod react;
pub mod workflow_driven;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::ChatCompletion;
use crate::models::{AgentDefinition, Task};
use crate::state_store::StateStore;
use crate::tools::ToolRegistry;

/// Everything an agent runtime needs to execute one task: shared state, the
/// configured LLM provider, the tool registry, and a cancellation token the
/// workflow controller signals on `Pause`/`Stop`.
pub struct ExecutionContext {
    pub store: Arc<StateStore>,
    pub llm: Arc<dyn ChatCompletion>,
    pub tools: ToolRegistry,
    pub cancellation: CancellationToken,
}

/// The outcome of running a task to the point where the runtime has nothing
/// further to do without outside input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task reached a final answer; carries the result text.
    Done(String),
    /// Execution was cancelled (pause/stop) before completion. The task's
    /// in-progress state (message history, iteration count) has already
    /// been persisted by the runtime so a later `Resume` can continue.
    Suspended,
    /// The task cannot make progress and the team should halt (design §9:
    /// a `BLOCKED` task halts the whole team, it does not get silently
    /// skipped).
    Blocked(String),
}

/// One strategy for turning a [`Task`] into a [`TaskOutcome`]. `React`
/// implements the think/act/observe loop directly against an LLM;
/// `WorkflowDriven` delegates to a sub-workflow collaborator.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn execute(
        &self,
        task: &Task,
        definition: &AgentDefinition,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome>;
}
