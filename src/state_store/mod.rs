//! The typed mutator surface for one team's state.
//!
//! Grounded on the teacher's `status_manager.rs` (status maps behind
//! `Arc<RwLock<HashMap>>`), `atomic_state.rs` (validated status transitions
//! under a fixed lock-acquisition order to avoid deadlocks), and
//! `result_store.rs` (result persistence). Generalized from the teacher's
//! fixed 5-state `TaskStatus` to the design's 7-state machine, and from a
//! flat map of statuses to a store that also owns the workflow log and
//! emits a `WorkflowLogEntry` on every mutation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{OrchestratorError, Result};
use crate::log_stream::LogStream;
use crate::models::{
    AgentCounters, AgentDefinition, AgentKind, AgentSnapshot, AgentStatus, CleanedState, Task,
    TaskId, TaskStats, TaskStatus, WorkflowLogEntry, WorkflowStatus,
};

/// Valid predecessor statuses for each task transition, mirroring the
/// teacher's `atomic_state.rs` validation table.
fn valid_predecessors(to: TaskStatus) -> &'static [TaskStatus] {
    use TaskStatus::*;
    match to {
        Todo => &[],
        Doing => &[Todo, Resumed],
        Paused => &[Doing],
        Resumed => &[Paused],
        Blocked => &[Doing, Todo],
        Done => &[Doing],
        Errored => &[Doing],
    }
}

struct Agents {
    definitions: HashMap<String, AgentDefinition>,
    statuses: HashMap<String, AgentStatus>,
    counters: HashMap<String, AgentCounters>,
}

/// Owns every piece of mutable state for one running team: the task table,
/// agent status table, workflow-level status, inputs/env, and the append
/// log. All mutation flows through this struct so the workflow log stays an
/// accurate record of every state change.
pub struct StateStore {
    team_id: String,
    tasks: RwLock<HashMap<TaskId, Task>>,
    agents: RwLock<Agents>,
    workflow_status: RwLock<WorkflowStatus>,
    workflow_result: RwLock<Option<String>>,
    /// Accumulated `"Task: <description> / Result: <result>"` entries for
    /// every task that has reached `DONE`, fed back to agents still to come
    /// (design §3, §4.3 "workflowContext construction").
    workflow_context: RwLock<String>,
    inputs: RwLock<HashMap<String, String>>,
    env: RwLock<HashMap<String, String>>,
    pub log: Arc<LogStream>,
}

impl StateStore {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            tasks: RwLock::new(HashMap::new()),
            agents: RwLock::new(Agents {
                definitions: HashMap::new(),
                statuses: HashMap::new(),
                counters: HashMap::new(),
            }),
            workflow_status: RwLock::new(WorkflowStatus::Initial),
            workflow_result: RwLock::new(None),
            workflow_context: RwLock::new(String::new()),
            inputs: RwLock::new(HashMap::new()),
            env: RwLock::new(HashMap::new()),
            log: Arc::new(LogStream::new()),
        }
    }

    pub async fn register_agent(&self, definition: AgentDefinition) {
        let mut agents = self.agents.write().await;
        agents
            .statuses
            .insert(definition.id.clone(), AgentStatus::Idle);
        agents
            .counters
            .insert(definition.id.clone(), AgentCounters::default());
        agents.definitions.insert(definition.id.clone(), definition);
    }

    /// Merges `updates` into every registered agent's own `env` map, the
    /// per-agent half of `SetEnv`'s atomic fan-out (design §4.3). The other
    /// half — the configured LLM provider's credentials — is applied by the
    /// caller through [`crate::llm::ChatCompletion::apply_env`].
    pub async fn patch_agent_envs(&self, updates: &HashMap<String, String>) {
        let mut agents = self.agents.write().await;
        for definition in agents.definitions.values_mut() {
            definition.env.extend(updates.clone());
        }
    }

    /// Applies `f` to one task's accumulated execution statistics, populated
    /// by the owning runtime at each THINKING/tool boundary (design §3.1).
    pub async fn update_task_stats(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut TaskStats),
    ) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))?;
        f(&mut task.stats);
        Ok(())
    }

    /// Bumps an agent's running iteration counter by one.
    pub async fn record_agent_iteration(&self, agent_id: &str) {
        if let Some(counters) = self.agents.write().await.counters.get_mut(agent_id) {
            counters.total_iterations += 1;
        }
    }

    /// Records that one of an agent's tasks finished successfully.
    pub async fn record_task_completed(&self, agent_id: &str) {
        if let Some(counters) = self.agents.write().await.counters.get_mut(agent_id) {
            counters.tasks_completed += 1;
        }
    }

    /// Records that one of an agent's tasks ended in `BLOCKED` or `ERRORED`.
    pub async fn record_task_failed(&self, agent_id: &str) {
        if let Some(counters) = self.agents.write().await.counters.get_mut(agent_id) {
            counters.tasks_failed += 1;
        }
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.definitions.get(agent_id).cloned()
    }

    pub async fn list_agent_ids(&self) -> Vec<String> {
        self.agents.read().await.definitions.keys().cloned().collect()
    }

    pub async fn set_agent_status(
        &self,
        agent_id: &str,
        task_id: Option<TaskId>,
        status: AgentStatus,
        metadata: Option<Value>,
    ) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents
            .statuses
            .get_mut(agent_id)
            .ok_or_else(|| OrchestratorError::UnknownAgent(agent_id.to_string()))?;
        *entry = status;
        drop(agents);
        self.log
            .append(WorkflowLogEntry::agent_status(
                0,
                agent_id,
                task_id,
                status,
                metadata,
            ))
            .await;
        Ok(())
    }

    pub async fn insert_task(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.clone(), task.clone());
        drop(tasks);
        self.log.append(WorkflowLogEntry::task_status(0, &task)).await;
        Ok(())
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Atomically validates and applies a task status transition, appending
    /// the resulting `TaskStatusUpdate` log entry. Mirrors the teacher's
    /// `atomic_state.rs::start_task_atomic`/`complete_task_atomic`, which
    /// reject a transition whose source status doesn't match expectation
    /// rather than silently overwriting it.
    pub async fn transition_task(
        &self,
        task_id: &str,
        to: TaskStatus,
        result: Option<String>,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))?;

        let allowed = valid_predecessors(to);
        if !allowed.is_empty() && !allowed.contains(&task.status) {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id}: cannot move {:?} -> {:?}",
                task.status, to
            )));
        }

        task.status = to;
        if result.is_some() {
            task.result = result;
        }
        let snapshot = task.clone();
        drop(tasks);

        if to == TaskStatus::Done {
            let entry = format!(
                "Task: {} / Result: {}\n",
                snapshot.description,
                snapshot.result.as_deref().unwrap_or("")
            );
            self.workflow_context.write().await.push_str(&entry);
        }

        self.log
            .append(WorkflowLogEntry::task_status(0, &snapshot))
            .await;
        Ok(snapshot)
    }

    /// The accumulated findings from every `DONE` task so far, fed to agents
    /// still to come (design §3 "workflowContext ... fed to the next task").
    pub async fn get_workflow_context(&self) -> String {
        self.workflow_context.read().await.clone()
    }

    pub async fn set_workflow_status(&self, status: WorkflowStatus) {
        *self.workflow_status.write().await = status;
        self.log
            .append(WorkflowLogEntry::workflow_status(0, status))
            .await;
    }

    pub async fn get_workflow_status(&self) -> WorkflowStatus {
        *self.workflow_status.read().await
    }

    pub async fn set_workflow_result(&self, result: String) {
        *self.workflow_result.write().await = Some(result);
    }

    pub async fn set_inputs(&self, inputs: HashMap<String, String>) {
        *self.inputs.write().await = inputs;
    }

    pub async fn get_inputs(&self) -> HashMap<String, String> {
        self.inputs.read().await.clone()
    }

    /// Merges `updates` into the team's environment, overwriting any
    /// existing keys (design's `SetEnv` operation, §4.6).
    pub async fn set_env(&self, updates: HashMap<String, String>) {
        self.env.write().await.extend(updates);
    }

    pub async fn get_env(&self) -> HashMap<String, String> {
        self.env.read().await.clone()
    }

    /// Renders the externally-visible `GetCleanedState` projection: all
    /// tasks and agent snapshots plus the full log, with no runtime handles
    /// or internal queues exposed (design §4.6).
    pub async fn cleaned_state(&self) -> CleanedState {
        let tasks = self.list_tasks().await;
        let agents_guard = self.agents.read().await;
        let agents = agents_guard
            .definitions
            .values()
            .map(|def| AgentSnapshot {
                id: def.id.clone(),
                name: def.name.clone(),
                role: def.role.clone(),
                kind: match def.kind {
                    AgentKind::React => AgentKind::React,
                    AgentKind::WorkflowDriven => AgentKind::WorkflowDriven,
                },
                status: *agents_guard
                    .statuses
                    .get(&def.id)
                    .unwrap_or(&AgentStatus::Idle),
                counters: agents_guard
                    .counters
                    .get(&def.id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        drop(agents_guard);

        CleanedState {
            team_id: self.team_id.clone(),
            workflow_status: self.get_workflow_status().await,
            tasks,
            agents,
            workflow_logs: self.log.history().await,
            workflow_result: self.workflow_result.read().await.clone(),
            workflow_context: self.get_workflow_context().await,
            inputs: self.get_inputs().await,
            env: self.get_env().await,
        }
    }
}
