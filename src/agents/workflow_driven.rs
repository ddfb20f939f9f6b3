//! `WorkflowDriven` agent runtime: delegates each task to a declarative
//! sub-workflow collaborator instead of reasoning over it directly (design
//! §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{AgentDefinition, AgentStatus, Task, TaskId};
use crate::subworkflow::{StepGraph, StepOutcome, SubWorkflowState};

use super::{AgentRuntime, ExecutionContext, TaskOutcome};

/// Executes tasks by handing them to a [`StepGraph`], persisting the
/// sub-workflow's cursor per task so a suspended run resumes where it left
/// off rather than restarting from the graph's entry step.
pub struct WorkflowDrivenRuntime {
    graph: StepGraph,
    state: Mutex<HashMap<TaskId, SubWorkflowState>>,
}

impl WorkflowDrivenRuntime {
    pub fn new(graph: StepGraph) -> Self {
        Self {
            graph,
            state: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AgentRuntime for WorkflowDrivenRuntime {
    async fn execute(
        &self,
        task: &Task,
        definition: &AgentDefinition,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let mut guard = self.state.lock().await;
        let state = guard.remove(&task.id).unwrap_or_else(|| {
            self.graph
                .initial_state(serde_json::json!({ "task": task.description }))
        });
        drop(guard);

        ctx.store
            .set_agent_status(
                &definition.id,
                Some(task.id.clone()),
                AgentStatus::Thinking,
                None,
            )
            .await?;

        let outcome = self.graph.run_from(state, &ctx.cancellation).await?;

        match outcome {
            StepOutcome::Done(result) => {
                ctx.store
                    .set_agent_status(
                        &definition.id,
                        Some(task.id.clone()),
                        AgentStatus::TaskCompleted,
                        None,
                    )
                    .await?;
                Ok(TaskOutcome::Done(result))
            }
            StepOutcome::Suspended(cursor) => {
                self.state.lock().await.insert(task.id.clone(), cursor);
                ctx.store
                    .set_agent_status(
                        &definition.id,
                        Some(task.id.clone()),
                        AgentStatus::Paused,
                        None,
                    )
                    .await?;
                Ok(TaskOutcome::Suspended)
            }
            StepOutcome::Failed(reason) => Ok(TaskOutcome::Blocked(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatCompletion;
    use crate::models::{AgentKind, LlmConfig};
    use crate::state_store::StateStore;
    use crate::subworkflow::{StepHandler, StepTransition};
    use crate::tools::ToolRegistry;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    struct AlwaysDone;

    #[async_trait]
    impl StepHandler for AlwaysDone {
        async fn run(&self, _context: Value) -> Result<StepTransition> {
            Ok(StepTransition::Done {
                result: "ok".to_string(),
            })
        }
    }

    struct NoopLlm;

    #[async_trait]
    impl ChatCompletion for NoopLlm {
        async fn complete(
            &self,
            _messages: &[crate::llm::ChatMessage],
            _config: &LlmConfig,
        ) -> Result<crate::llm::Completion> {
            Ok(crate::llm::Completion {
                content: String::new(),
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn delegates_to_graph_and_reports_done() {
        let mut graph = StepGraph::new("start");
        graph.add_step("start", Arc::new(AlwaysDone));
        let runtime = WorkflowDrivenRuntime::new(graph);

        let definition = AgentDefinition::new("planner", "Planner", AgentKind::WorkflowDriven);
        let task = Task::new("planner", "plan the release");
        let store = Arc::new(StateStore::new("team-1"));
        store.register_agent(definition.clone()).await;

        let ctx = ExecutionContext {
            store,
            llm: Arc::new(NoopLlm),
            tools: ToolRegistry::new(),
            cancellation: CancellationToken::new(),
        };

        let outcome = runtime.execute(&task, &definition, &ctx).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Done("ok".to_string()));
    }
}
