//! The Workflow Controller: the public Start/Pause/Resume/Stop/SetEnv
//! surface and the driver loop that admits tasks and dispatches them to
//! agent runtimes (design §4.3, §4.6).
//!
//! Grounded on the teacher's `agents/orchestrator/mod.rs::run`, which
//! spawns a handful of cooperating loops (`task_processor`,
//! `result_processor`, `cleanup_processor`) coordinated with
//! `tokio::select!`; here that collapses to one driver loop per team that
//! admits tasks from the [`crate::task_queue::TaskQueue`], spawns each onto
//! its agent's [`AgentRuntime`], and reacts to completions as they arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentRuntime, ExecutionContext, TaskOutcome};
use crate::constants::TASK_POLL_INTERVAL_MS;
use crate::error::{OrchestratorError, Result};
use crate::llm::ChatCompletion;
use crate::models::{AgentDefinition, AgentKind, CleanedState, Task, TaskId, TaskStatus, WorkflowStatus};
use crate::state_store::StateStore;
use crate::task_queue::TaskQueue;
use crate::tools::ToolRegistry;

type TaskCompletion = (TaskId, Result<TaskOutcome>);

/// Resolves `{placeholder}` tokens in a task description against `inputs`
/// at `Start` time (design §4.3 "input interpolation"). A token with no
/// matching input is left verbatim rather than erroring.
fn interpolate_inputs(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in inputs {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

/// Owns one team's run: its state, its task queue policy, its agent
/// runtimes, and the background driver task.
pub struct WorkflowController {
    store: Arc<StateStore>,
    queue: TaskQueue,
    runtimes: HashMap<AgentKind, Arc<dyn AgentRuntime>>,
    llm: Arc<dyn ChatCompletion>,
    tools: ToolRegistry,
    task_tokens: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl WorkflowController {
    pub fn new(
        store: Arc<StateStore>,
        max_in_flight: usize,
        llm: Arc<dyn ChatCompletion>,
        tools: ToolRegistry,
        runtimes: HashMap<AgentKind, Arc<dyn AgentRuntime>>,
    ) -> Self {
        Self {
            store,
            queue: TaskQueue::new(max_in_flight),
            runtimes,
            llm,
            tools,
            task_tokens: Arc::new(Mutex::new(HashMap::new())),
            driver: Mutex::new(None),
        }
    }

    /// Validates the task graph, registers `agents` and `tasks`, and starts
    /// the driver loop. Fails synchronously (no log entry, no partial
    /// state) if the graph contains a cycle or a task references an
    /// unregistered agent — this is the one operation allowed to fail
    /// before anything is written (design §7 "configuration errors fail
    /// Start synchronously").
    pub async fn start(
        &self,
        agents: Vec<AgentDefinition>,
        tasks: Vec<Task>,
        inputs: HashMap<String, String>,
    ) -> Result<()> {
        if self.store.get_workflow_status().await != WorkflowStatus::Initial {
            return Err(OrchestratorError::InvalidTransition(
                "team already started".to_string(),
            ));
        }

        self.queue.validate(&tasks)?;

        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|mut task| {
                task.description = interpolate_inputs(&task.description, &inputs);
                task
            })
            .collect();

        let known_agents: std::collections::HashSet<&str> =
            agents.iter().map(|a| a.id.as_str()).collect();
        for task in &tasks {
            if !known_agents.contains(task.agent_id.as_str()) {
                return Err(OrchestratorError::UnknownAgent(task.agent_id.clone()));
            }
            if !self.runtimes.contains_key(
                &agents
                    .iter()
                    .find(|a| a.id == task.agent_id)
                    .expect("checked above")
                    .kind,
            ) {
                return Err(OrchestratorError::Configuration(format!(
                    "no runtime registered for agent kind used by {}",
                    task.agent_id
                )));
            }
        }

        for agent in agents {
            self.store.register_agent(agent).await;
        }
        for task in tasks {
            self.store.insert_task(task).await?;
        }
        self.store.set_inputs(inputs).await;
        self.store.set_workflow_status(WorkflowStatus::Running).await;

        self.spawn_driver().await;
        Ok(())
    }

    /// Cancels every in-flight task and moves the team to `PAUSED`. Tasks
    /// that were `DOING` persist their runtime state (message history,
    /// iteration count, or sub-workflow cursor) and move to `PAUSED`
    /// themselves; a later `Resume` moves them to `RESUMED` and the driver
    /// picks them back up where they left off.
    pub async fn pause(&self) -> Result<()> {
        let status = self.store.get_workflow_status().await;
        if status != WorkflowStatus::Running {
            return Err(OrchestratorError::InvalidTransition(format!(
                "cannot pause from {status:?}"
            )));
        }
        self.cancel_in_flight().await;
        self.store.set_workflow_status(WorkflowStatus::Paused).await;
        Ok(())
    }

    /// Moves every `PAUSED` task to `RESUMED` and restarts the driver loop.
    pub async fn resume(&self) -> Result<()> {
        let status = self.store.get_workflow_status().await;
        if status != WorkflowStatus::Paused {
            return Err(OrchestratorError::InvalidTransition(format!(
                "cannot resume from {status:?}"
            )));
        }
        for task in self.store.list_tasks().await {
            if task.status == TaskStatus::Paused {
                self.store
                    .transition_task(&task.id, TaskStatus::Resumed, None)
                    .await?;
            }
        }
        self.store.set_workflow_status(WorkflowStatus::Running).await;
        self.spawn_driver().await;
        Ok(())
    }

    /// Cancels every in-flight task and moves the team to `STOPPED`
    /// permanently; unlike `Pause`, a stopped team cannot be resumed. A
    /// task that was `DOING` resets to `TODO` (its in-progress reasoning is
    /// discarded, not persisted as resumable); a task already `DONE` is
    /// left untouched (design §9: stop does not reset completed work).
    pub async fn stop(&self) -> Result<()> {
        let status = self.store.get_workflow_status().await;
        if matches!(status, WorkflowStatus::Stopped | WorkflowStatus::Finished) {
            return Ok(());
        }
        self.cancel_in_flight().await;
        self.store.set_workflow_status(WorkflowStatus::Stopping).await;
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
        }
        for task in self.store.list_tasks().await {
            if task.status == TaskStatus::Doing {
                let _ = self.store.transition_task(&task.id, TaskStatus::Todo, None).await;
            }
        }
        self.task_tokens.lock().await.clear();
        self.store.set_workflow_status(WorkflowStatus::Stopped).await;
        Ok(())
    }

    /// Atomically fans `updates` out to the team's environment, every
    /// registered agent's own `env`, and the configured LLM provider's
    /// credentials, so the next HTTP call already carries them (design §4.3
    /// "SetEnv ... visible to the next HTTP call").
    pub async fn set_env(&self, updates: HashMap<String, String>) {
        self.store.set_env(updates.clone()).await;
        self.store.patch_agent_envs(&updates).await;
        self.llm.apply_env(&updates);
    }

    pub async fn get_cleaned_state(&self) -> CleanedState {
        self.store.cleaned_state().await
    }

    pub fn subscribe(&self, selector: crate::log_stream::Selector) -> crate::log_stream::LogSubscription {
        self.store.log.subscribe(selector)
    }

    async fn cancel_in_flight(&self) {
        let tokens = self.task_tokens.lock().await;
        for token in tokens.values() {
            token.cancel();
        }
    }

    async fn spawn_driver(&self) {
        let store = self.store.clone();
        let queue = self.queue;
        let runtimes = self.runtimes.clone();
        let llm = self.llm.clone();
        let tools = self.tools.clone();
        let task_tokens = self.task_tokens.clone();

        let handle = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<TaskCompletion>();

            loop {
                if store.get_workflow_status().await != WorkflowStatus::Running {
                    break;
                }

                let tasks = store.list_tasks().await;
                if tasks.iter().any(|t| t.status == TaskStatus::Blocked) {
                    store.set_workflow_status(WorkflowStatus::Blocked).await;
                    break;
                }
                if TaskQueue::all_terminal(&tasks) {
                    store.set_workflow_status(WorkflowStatus::Finished).await;
                    break;
                }

                let in_flight = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Doing)
                    .count();
                let admissible = queue.admissible(&tasks, in_flight);

                if admissible.is_empty() && in_flight == 0 {
                    store.set_workflow_status(WorkflowStatus::Blocked).await;
                    break;
                }

                for task_id in admissible {
                    let task = match store.get_task(&task_id).await {
                        Some(t) => t,
                        None => continue,
                    };
                    let definition = match store.get_agent(&task.agent_id).await {
                        Some(d) => d,
                        None => continue,
                    };
                    let runtime = match runtimes.get(&definition.kind) {
                        Some(r) => r.clone(),
                        None => continue,
                    };

                    if store
                        .transition_task(&task_id, TaskStatus::Doing, None)
                        .await
                        .is_err()
                    {
                        continue;
                    }

                    let token = CancellationToken::new();
                    task_tokens.lock().await.insert(task_id.clone(), token.clone());

                    let ctx = ExecutionContext {
                        store: store.clone(),
                        llm: llm.clone(),
                        tools: tools.clone(),
                        cancellation: token,
                    };
                    let tx = tx.clone();
                    let task_id_for_spawn = task_id.clone();

                    tokio::spawn(async move {
                        let result = runtime.execute(&task, &definition, &ctx).await;
                        let _ = tx.send((task_id_for_spawn, result));
                    });
                }

                tokio::select! {
                    Some((task_id, result)) = rx.recv() => {
                        task_tokens.lock().await.remove(&task_id);
                        let agent_id = store.get_task(&task_id).await.map(|t| t.agent_id);
                        match result {
                            Ok(TaskOutcome::Done(output)) => {
                                if let Some(agent_id) = &agent_id {
                                    store.record_task_completed(agent_id).await;
                                }
                                let _ = store.transition_task(&task_id, TaskStatus::Done, Some(output)).await;
                            }
                            Ok(TaskOutcome::Suspended) => {
                                let _ = store.transition_task(&task_id, TaskStatus::Paused, None).await;
                            }
                            Ok(TaskOutcome::Blocked(reason)) => {
                                if let Some(agent_id) = &agent_id {
                                    store.record_task_failed(agent_id).await;
                                }
                                let _ = store.transition_task(&task_id, TaskStatus::Blocked, Some(reason)).await;
                            }
                            Err(err) => {
                                if let Some(agent_id) = &agent_id {
                                    store.record_task_failed(agent_id).await;
                                }
                                let _ = store.transition_task(&task_id, TaskStatus::Errored, Some(err.to_string())).await;
                            }
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(TASK_POLL_INTERVAL_MS)) => {}
                }
            }
        });

        *self.driver.lock().await = Some(handle);
    }
}
