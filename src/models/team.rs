use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::agent::{AgentCounters, AgentKind, AgentStatus};
use super::log::{WorkflowLogEntry, WorkflowStatus};
use super::task::{AgentId, Task};

/// A point-in-time view of one agent, as exposed through the cleaned-state
/// projection. Deliberately excludes runtime handles (channels, join
/// handles) — those never leave the process (design §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub counters: AgentCounters,
}

/// The externally-visible shape of `GetCleanedState` (design §4.6): all
/// tasks and agents, the full log, and team-level bookkeeping, with the
/// internal `executingTasks`/`pendingTasks` queues and runtime handles
/// stripped out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedState {
    pub team_id: String,
    pub workflow_status: WorkflowStatus,
    pub tasks: Vec<Task>,
    pub agents: Vec<AgentSnapshot>,
    pub workflow_logs: Vec<WorkflowLogEntry>,
    pub workflow_result: Option<String>,
    pub workflow_context: String,
    pub inputs: HashMap<String, String>,
    pub env: HashMap<String, String>,
}
