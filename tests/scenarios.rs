//! End-to-end scenarios exercising the Workflow Controller against the
//! real `ReactRuntime`, with a scripted LLM standing in for the provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduct_core::agents::react::ReactRuntime;
use conduct_core::agents::AgentRuntime;
use conduct_core::error::Result;
use conduct_core::llm::{ChatCompletion, ChatMessage, Completion, TokenUsage};
use conduct_core::log_stream::select_all;
use conduct_core::models::{
    AgentDefinition, AgentKind, LlmConfig, LogPayload, Task, TaskStatus, WorkflowStatus,
};
use conduct_core::state_store::StateStore;
use conduct_core::tools::{EchoTool, ToolRegistry};
use conduct_core::workflow::WorkflowController;
use serde_json::Value;
use tokio::sync::Notify;

/// Always answers `final_answer` with the given content on its first call.
struct ImmediateFinalAnswer(String);

#[async_trait]
impl ChatCompletion for ImmediateFinalAnswer {
    async fn complete(&self, _messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        Ok(Completion {
            content: format!(
                "{{\"type\":\"final_answer\",\"content\":\"{}\"}}",
                self.0
            ),
            usage: TokenUsage::default(),
        })
    }
}

/// Blocks its first call on `gate` before returning a `thought`; every
/// later call returns a `final_answer`. Lets a test pause the workflow
/// while the first LLM call is still in flight, deterministically.
struct GatedThenDone {
    gate: Arc<Notify>,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompletion for GatedThenDone {
    async fn complete(&self, _messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = if idx == 0 {
            self.gate.notified().await;
            "{\"type\":\"thought\",\"content\":\"still working\"}".to_string()
        } else {
            "{\"type\":\"final_answer\",\"content\":\"finished\"}".to_string()
        };
        Ok(Completion {
            content,
            usage: TokenUsage::default(),
        })
    }
}

/// Gated on `messages[0].content` containing a marker substring rather than
/// call order, so a test can control one task's LLM behavior independently
/// of another's without the double knowing about task identity.
struct MarkerGatedLlm {
    gate: Arc<Notify>,
    marker: &'static str,
}

#[async_trait]
impl ChatCompletion for MarkerGatedLlm {
    async fn complete(&self, messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        let is_marked = messages
            .first()
            .map(|m| m.content.contains(self.marker))
            .unwrap_or(false);
        if is_marked {
            self.gate.notified().await;
        }
        Ok(Completion {
            content: "{\"type\":\"final_answer\",\"content\":\"done\"}".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

/// Returns `block_task` on its first call, regardless of content.
struct AlwaysBlocks;

#[async_trait]
impl ChatCompletion for AlwaysBlocks {
    async fn complete(&self, _messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        Ok(Completion {
            content: "{\"type\":\"block_task\",\"reason\":\"cannot proceed\"}".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

/// Blocks its first call on `gate`, then echoes back whatever
/// `LLM_API_KEY` is live on its second call — lets a test rotate
/// credentials while a task is mid-reasoning and observe whether the
/// rotation reached the provider in time for the very next call.
struct MidFlightEnvLlm {
    api_key: std::sync::RwLock<Option<String>>,
    gate: Arc<Notify>,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompletion for MidFlightEnvLlm {
    async fn complete(&self, _messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if idx == 0 {
            self.gate.notified().await;
            return Ok(Completion {
                content: "{\"type\":\"thought\",\"content\":\"waiting\"}".to_string(),
                usage: TokenUsage::default(),
            });
        }
        let key = self.api_key.read().unwrap().clone().unwrap_or_default();
        Ok(Completion {
            content: format!("{{\"type\":\"final_answer\",\"content\":\"{key}\"}}"),
            usage: TokenUsage::default(),
        })
    }

    fn apply_env(&self, updates: &HashMap<String, String>) {
        if let Some(key) = updates.get("LLM_API_KEY") {
            *self.api_key.write().unwrap() = Some(key.clone());
        }
    }
}

/// Tracks how many calls whose system prompt embeds a *sequential* task's
/// description are concurrently in flight, flagging if that count ever
/// exceeds one — two sequential tasks running at once is never correct,
/// whatever else (parallel tasks) happens to be in flight alongside them
/// (invariant 7).
struct ConcurrencyTrackingLlm {
    seq_in_flight: Arc<std::sync::atomic::AtomicUsize>,
    sequential_overlap_detected: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl ChatCompletion for ConcurrencyTrackingLlm {
    async fn complete(&self, messages: &[ChatMessage], _config: &LlmConfig) -> Result<Completion> {
        let is_sequential = messages
            .first()
            .map(|m| m.content.contains("seq-task"))
            .unwrap_or(false);
        if is_sequential {
            let current = self.seq_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            if current > 1 {
                self.sequential_overlap_detected
                    .store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        if is_sequential {
            self.seq_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(Completion {
            content: "{\"type\":\"final_answer\",\"content\":\"done\"}".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

fn react_controller(llm: Arc<dyn ChatCompletion>, max_in_flight: usize) -> WorkflowController {
    let store = Arc::new(StateStore::new("test-team"));
    let mut runtimes: HashMap<AgentKind, Arc<dyn AgentRuntime>> = HashMap::new();
    runtimes.insert(AgentKind::React, Arc::new(ReactRuntime::new()));
    WorkflowController::new(store, max_in_flight, llm, ToolRegistry::new(), runtimes)
}

fn worker_agent(id: &str) -> AgentDefinition {
    AgentDefinition::new(id, id, AgentKind::React)
        .with_role("worker")
        .with_goal("finish the assigned task")
}

async fn wait_for_workflow_status(
    controller: &WorkflowController,
    target: WorkflowStatus,
    timeout: Duration,
) {
    tokio::time::timeout(timeout, async {
        loop {
            if controller.get_cleaned_state().await.workflow_status == target {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("workflow status never reached {target:?}"));
}

async fn wait_for_task_status(
    controller: &WorkflowController,
    task_id: &str,
    target: TaskStatus,
    timeout: Duration,
) {
    tokio::time::timeout(timeout, async {
        loop {
            let state = controller.get_cleaned_state().await;
            if state
                .tasks
                .iter()
                .any(|t| t.id == task_id && t.status == target)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {task_id} never reached {target:?}"));
}

/// S1 — two tasks, T2 depends on T1. Expect INITIAL -> RUNNING -> FINISHED,
/// both tasks DOING -> DONE, and T1's DONE entry precedes T2's first
/// DOING entry in the log (invariant 1).
#[tokio::test]
async fn sequential_dependency_runs_in_order() {
    let llm = Arc::new(ImmediateFinalAnswer("done".to_string()));
    let controller = react_controller(llm, 4);

    let t1 = Task::new("worker", "first");
    let t2 = Task::new("worker", "second").depends_on([t1.id.clone()]);
    let t1_id = t1.id.clone();
    let t2_id = t2.id.clone();

    controller
        .start(vec![worker_agent("worker")], vec![t1, t2], HashMap::new())
        .await
        .unwrap();

    wait_for_workflow_status(&controller, WorkflowStatus::Finished, Duration::from_secs(5)).await;

    let state = controller.get_cleaned_state().await;
    let by_id: HashMap<_, _> = state.tasks.iter().map(|t| (t.id.clone(), t)).collect();
    assert_eq!(by_id[&t1_id].status, TaskStatus::Done);
    assert_eq!(by_id[&t2_id].status, TaskStatus::Done);

    let t1_done_seq = state
        .workflow_logs
        .iter()
        .find(|entry| {
            matches!(&entry.payload, LogPayload::TaskStatusUpdate { task_id, task_status, .. }
                if task_id == &t1_id && *task_status == TaskStatus::Done)
        })
        .map(|entry| entry.sequence)
        .expect("t1 done entry");

    let t2_doing_seq = state
        .workflow_logs
        .iter()
        .find(|entry| {
            matches!(&entry.payload, LogPayload::TaskStatusUpdate { task_id, task_status, .. }
                if task_id == &t2_id && *task_status == TaskStatus::Doing)
        })
        .map(|entry| entry.sequence)
        .expect("t2 doing entry");

    assert!(t1_done_seq < t2_doing_seq);
}

/// S2 — a seed task plus two dependents marked parallel. Expect both
/// dependents to finish once their shared dependency is done.
#[tokio::test]
async fn parallel_branches_both_complete() {
    let llm = Arc::new(ImmediateFinalAnswer("done".to_string()));
    let controller = react_controller(llm, 4);

    let seed = Task::new("worker", "seed");
    let branch_a = Task::new("worker", "a")
        .depends_on([seed.id.clone()])
        .allow_parallel(true);
    let branch_b = Task::new("worker", "b")
        .depends_on([seed.id.clone()])
        .allow_parallel(true);

    controller
        .start(
            vec![worker_agent("worker")],
            vec![seed, branch_a, branch_b],
            HashMap::new(),
        )
        .await
        .unwrap();

    wait_for_workflow_status(&controller, WorkflowStatus::Finished, Duration::from_secs(5)).await;

    let state = controller.get_cleaned_state().await;
    assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Done));
}

/// S4 — pause while a task is mid-reasoning, then resume. Expect the task
/// to move DOING -> PAUSED -> DOING -> DONE, and the team to finish
/// afterward.
#[tokio::test]
async fn pause_then_resume_completes_the_task() {
    let gate = Arc::new(Notify::new());
    let llm = Arc::new(GatedThenDone {
        gate: gate.clone(),
        calls: AtomicUsize::new(0),
    });
    let controller = react_controller(llm, 4);

    let task = Task::new("worker", "long task");
    let task_id = task.id.clone();

    controller
        .start(vec![worker_agent("worker")], vec![task], HashMap::new())
        .await
        .unwrap();

    wait_for_task_status(&controller, &task_id, TaskStatus::Doing, Duration::from_secs(5)).await;

    controller.pause().await.unwrap();
    gate.notify_one();

    wait_for_task_status(&controller, &task_id, TaskStatus::Paused, Duration::from_secs(5)).await;
    assert_eq!(
        controller.get_cleaned_state().await.workflow_status,
        WorkflowStatus::Paused
    );

    controller.resume().await.unwrap();

    wait_for_task_status(&controller, &task_id, TaskStatus::Done, Duration::from_secs(5)).await;
    wait_for_workflow_status(&controller, WorkflowStatus::Finished, Duration::from_secs(5)).await;
}

/// A `WorkflowDriven` sub-workflow that always fails blocks its task and
/// halts the whole team rather than letting siblings keep running
/// (design §9).
#[tokio::test]
async fn blocked_subworkflow_halts_the_team() {
    use conduct_core::agents::workflow_driven::WorkflowDrivenRuntime;
    use conduct_core::subworkflow::{StepGraph, StepHandler, StepTransition};

    struct AlwaysFails;
    #[async_trait]
    impl StepHandler for AlwaysFails {
        async fn run(&self, _context: Value) -> Result<StepTransition> {
            Ok(StepTransition::Fail {
                reason: "precondition not met".to_string(),
            })
        }
    }

    let mut graph = StepGraph::new("start");
    graph.add_step("start", Arc::new(AlwaysFails));

    let store = Arc::new(StateStore::new("test-team"));
    let mut runtimes: HashMap<AgentKind, Arc<dyn AgentRuntime>> = HashMap::new();
    runtimes.insert(
        AgentKind::WorkflowDriven,
        Arc::new(WorkflowDrivenRuntime::new(graph)),
    );
    let controller = WorkflowController::new(
        store,
        4,
        Arc::new(ImmediateFinalAnswer("unused".to_string())),
        ToolRegistry::new(),
        runtimes,
    );

    let planner = AgentDefinition::new("planner", "planner", AgentKind::WorkflowDriven);
    let task = Task::new("planner", "do the impossible");
    let task_id = task.id.clone();

    controller
        .start(vec![planner], vec![task], HashMap::new())
        .await
        .unwrap();

    wait_for_task_status(&controller, &task_id, TaskStatus::Blocked, Duration::from_secs(5)).await;
    wait_for_workflow_status(&controller, WorkflowStatus::Blocked, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn echo_tool_round_trips_through_registry() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));
    let result = tools
        .invoke("echo", serde_json::json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(result, serde_json::json!({"x": 1}));
}

#[tokio::test]
async fn log_subscription_sees_workflow_status_progression() {
    let llm = Arc::new(ImmediateFinalAnswer("done".to_string()));
    let controller = react_controller(llm, 4);
    let mut subscription = controller.subscribe(select_all());

    let task = Task::new("worker", "solo");
    controller
        .start(vec![worker_agent("worker")], vec![task], HashMap::new())
        .await
        .unwrap();

    let mut saw_finished = false;
    for _ in 0..200 {
        if let Ok(Some(entry)) =
            tokio::time::timeout(Duration::from_millis(50), subscription.next()).await
        {
            if matches!(
                entry.payload,
                LogPayload::WorkflowStatusUpdate {
                    workflow_status: WorkflowStatus::Finished
                }
            ) {
                saw_finished = true;
                break;
            }
        }
    }
    assert!(
        saw_finished,
        "expected to observe a Finished workflow status entry"
    );
}

/// S3 — a mix of independent parallel and sequential tasks. Sequential
/// tasks must never run concurrently with anything else, even though
/// parallel tasks may run concurrently with each other (invariant 7).
#[tokio::test]
async fn mixed_parallel_and_sequential_tasks_respect_their_flags() {
    let seq_in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sequential_overlap_detected = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let llm = Arc::new(ConcurrencyTrackingLlm {
        seq_in_flight,
        sequential_overlap_detected: sequential_overlap_detected.clone(),
    });
    let controller = react_controller(llm, 8);

    let tasks = vec![
        Task::new("worker", "par-task one").allow_parallel(true),
        Task::new("worker", "par-task two").allow_parallel(true),
        Task::new("worker", "par-task three").allow_parallel(true),
        Task::new("worker", "seq-task one"),
        Task::new("worker", "seq-task two"),
    ];

    controller
        .start(vec![worker_agent("worker")], tasks, HashMap::new())
        .await
        .unwrap();

    wait_for_workflow_status(&controller, WorkflowStatus::Finished, Duration::from_secs(5)).await;

    let state = controller.get_cleaned_state().await;
    assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Done));
    assert!(
        !sequential_overlap_detected.load(std::sync::atomic::Ordering::SeqCst),
        "a sequential task ran concurrently with another in-flight task"
    );
}

/// S5 — stop while a task is mid-reasoning. Expect the in-flight task to
/// reset DOING -> TODO and the team to move to STOPPED, while a task that
/// had already finished stays DONE (design §9).
#[tokio::test]
async fn stop_resets_in_flight_tasks_but_leaves_done_tasks_alone() {
    let gate = Arc::new(Notify::new());
    let llm = Arc::new(MarkerGatedLlm {
        gate: gate.clone(),
        marker: "gate-me",
    });
    let controller = react_controller(llm, 4);

    let done_task = Task::new("worker", "quick one");
    let gated_task = Task::new("worker", "gate-me please");
    let done_id = done_task.id.clone();
    let gated_id = gated_task.id.clone();

    controller
        .start(
            vec![worker_agent("worker")],
            vec![done_task, gated_task],
            HashMap::new(),
        )
        .await
        .unwrap();

    wait_for_task_status(&controller, &done_id, TaskStatus::Done, Duration::from_secs(5)).await;
    wait_for_task_status(&controller, &gated_id, TaskStatus::Doing, Duration::from_secs(5)).await;

    controller.stop().await.unwrap();
    gate.notify_one();

    let state = controller.get_cleaned_state().await;
    assert_eq!(state.workflow_status, WorkflowStatus::Stopped);
    let by_id: HashMap<_, _> = state.tasks.iter().map(|t| (t.id.clone(), t)).collect();
    assert_eq!(by_id[&done_id].status, TaskStatus::Done);
    assert_eq!(by_id[&gated_id].status, TaskStatus::Todo);
}

/// S6 — a ReAct agent calls `block_task`. Expect the task to move to
/// BLOCKED carrying the given reason and the whole team to halt with it.
#[tokio::test]
async fn react_agent_block_task_halts_the_team() {
    let llm = Arc::new(AlwaysBlocks);
    let controller = react_controller(llm, 4);

    let task = Task::new("worker", "impossible");
    let task_id = task.id.clone();

    controller
        .start(vec![worker_agent("worker")], vec![task], HashMap::new())
        .await
        .unwrap();

    wait_for_task_status(&controller, &task_id, TaskStatus::Blocked, Duration::from_secs(5)).await;
    wait_for_workflow_status(&controller, WorkflowStatus::Blocked, Duration::from_secs(5)).await;

    let state = controller.get_cleaned_state().await;
    let task = state.tasks.iter().find(|t| t.id == task_id).unwrap();
    assert_eq!(task.result.as_deref(), Some("cannot proceed"));
}

/// S7 — `SetEnv` while a task is mid-reasoning must be visible on that
/// task's very next LLM call, not just on tasks started afterward
/// (invariant 6).
#[tokio::test]
async fn set_env_mid_flight_is_visible_on_the_next_llm_call() {
    let gate = Arc::new(Notify::new());
    let llm = Arc::new(MidFlightEnvLlm {
        api_key: std::sync::RwLock::new(Some("sk-original".to_string())),
        gate: gate.clone(),
        calls: AtomicUsize::new(0),
    });
    let controller = react_controller(llm, 4);

    let task = Task::new("worker", "report the key");
    let task_id = task.id.clone();

    controller
        .start(vec![worker_agent("worker")], vec![task], HashMap::new())
        .await
        .unwrap();

    wait_for_task_status(&controller, &task_id, TaskStatus::Doing, Duration::from_secs(5)).await;

    let mut updates = HashMap::new();
    updates.insert("LLM_API_KEY".to_string(), "sk-rotated".to_string());
    controller.set_env(updates).await;
    gate.notify_one();

    wait_for_task_status(&controller, &task_id, TaskStatus::Done, Duration::from_secs(5)).await;

    let state = controller.get_cleaned_state().await;
    let task = state.tasks.iter().find(|t| t.id == task_id).unwrap();
    assert_eq!(task.result.as_deref(), Some("sk-rotated"));
}
