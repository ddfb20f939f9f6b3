use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agent::AgentStatus;
use super::task::{AgentId, Task, TaskId, TaskStatus};

/// Team-level execution status, surfaced both in `WorkflowStatusUpdate` log
/// entries and in the cleaned-state projection (design §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Initial,
    Running,
    Paused,
    Stopping,
    Stopped,
    Blocked,
    Errored,
    Finished,
}

/// The payload carried by one workflow log entry. A closed set, matching the
/// design's three log kinds (§4.1): workflow-level, task-level, agent-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LogPayload {
    WorkflowStatusUpdate {
        workflow_status: WorkflowStatus,
    },
    TaskStatusUpdate {
        task_id: TaskId,
        agent_id: AgentId,
        task_status: TaskStatus,
    },
    AgentStatusUpdate {
        agent_id: AgentId,
        task_id: Option<TaskId>,
        agent_status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

/// One append-only entry in a team's workflow log (design §4.1).
///
/// `sequence` is assigned by the log store at append time and is the basis
/// for the subscription model's value-equality gating: a subscriber only
/// receives entries whose selector projection differs from the last one it
/// saw, never a replay of identical consecutive values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: LogPayload,
}

impl WorkflowLogEntry {
    pub fn task_status(sequence: u64, task: &Task) -> Self {
        Self {
            sequence,
            timestamp: chrono::Utc::now(),
            payload: LogPayload::TaskStatusUpdate {
                task_id: task.id.clone(),
                agent_id: task.agent_id.clone(),
                task_status: task.status,
            },
        }
    }

    pub fn workflow_status(sequence: u64, workflow_status: WorkflowStatus) -> Self {
        Self {
            sequence,
            timestamp: chrono::Utc::now(),
            payload: LogPayload::WorkflowStatusUpdate { workflow_status },
        }
    }

    pub fn agent_status(
        sequence: u64,
        agent_id: impl Into<AgentId>,
        task_id: Option<TaskId>,
        agent_status: AgentStatus,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            sequence,
            timestamp: chrono::Utc::now(),
            payload: LogPayload::AgentStatusUpdate {
                agent_id: agent_id.into(),
                task_id,
                agent_status,
                metadata,
            },
        }
    }
}
