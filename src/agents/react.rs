//! The think/act/observe bounded reasoning loop (design §4.4).
//!
//! Structurally this mirrors the teacher's `execute_task` in
//! `agents/orchestrator/mod.rs` — a bounded loop driving one task through a
//! sequence of states with status updates emitted at each transition — but
//! the loop body is now LLM-driven rather than a single synchronous call,
//! and every iteration is a cancellation point so `Pause` can suspend mid
//! task without losing work.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::llm::{with_retry, ChatCompletion, ChatMessage};
use crate::models::{AgentDefinition, AgentStatus, Task, TaskId};

use super::{AgentRuntime, ExecutionContext, TaskOutcome};

/// The closed set of shapes a ReAct step's LLM output can take. Parsing is
/// strict: anything that doesn't match one of these four tagged variants
/// is a malformed-output error, not a best-effort guess.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReactStep {
    Thought {
        content: String,
        #[serde(default)]
        action: Option<ActionCall>,
    },
    SelfQuestion {
        question: String,
    },
    FinalAnswer {
        content: String,
    },
    /// The agent declares it cannot make progress; transitions the task to
    /// `BLOCKED` and, per the team-halt rule, the whole team with it.
    BlockTask {
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct ActionCall {
    tool: String,
    input: Value,
}

/// Per-task conversation state, preserved across a pause/resume cycle so a
/// suspended task picks back up with full message history and iteration
/// count intact rather than restarting from scratch.
#[derive(Default, Clone)]
struct ReactState {
    messages: Vec<ChatMessage>,
    iterations: u32,
}

/// Executes tasks via the ReAct loop, keyed by task id so suspended
/// conversations survive a `Pause`/`Resume` within the runtime's lifetime.
#[derive(Default)]
pub struct ReactRuntime {
    state: Mutex<HashMap<TaskId, ReactState>>,
}

impl ReactRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn system_prompt(definition: &AgentDefinition, task: &Task, workflow_context: &str) -> String {
        let findings = if workflow_context.is_empty() {
            "(none yet)".to_string()
        } else {
            workflow_context.to_string()
        };
        format!(
            "You are {name}, {role}. Your goal: {goal}. Background: {background}.\n\
             Task: {description}\n\
             Findings from previous tasks:\n{findings}\n\
             Available tools: {tools}.\n\
             Respond with exactly one JSON object shaped as one of:\n\
             {{\"type\":\"thought\",\"content\":\"...\",\"action\":{{\"tool\":\"...\",\"input\":...}}}}\n\
             {{\"type\":\"self_question\",\"question\":\"...\"}}\n\
             {{\"type\":\"final_answer\",\"content\":\"...\"}}\n\
             {{\"type\":\"block_task\",\"reason\":\"...\"}}",
            name = definition.name,
            role = definition.role,
            goal = definition.goal,
            background = definition.background,
            description = task.description,
            tools = definition.tools.join(", "),
        )
    }
}

#[async_trait]
impl AgentRuntime for ReactRuntime {
    async fn execute(
        &self,
        task: &Task,
        definition: &AgentDefinition,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let mut guard = self.state.lock().await;
        let mut conversation = guard.remove(&task.id).unwrap_or_default();
        drop(guard);

        if conversation.messages.is_empty() {
            let workflow_context = ctx.store.get_workflow_context().await;
            conversation.messages.push(ChatMessage::system(Self::system_prompt(
                definition,
                task,
                &workflow_context,
            )));
        }

        let outcome = loop {
            if ctx.cancellation.is_cancelled() {
                break Ok(TaskOutcome::Suspended);
            }
            if conversation.iterations >= definition.max_iterations {
                break Err(OrchestratorError::IterationLimitExceeded {
                    iterations: conversation.iterations,
                });
            }

            ctx.store
                .set_agent_status(
                    &definition.id,
                    Some(task.id.clone()),
                    AgentStatus::Thinking,
                    Some(serde_json::json!({
                        "iteration": conversation.iterations,
                        "messages": conversation.messages,
                    })),
                )
                .await?;

            let llm = ctx.llm.clone();
            let llm_config = definition.llm_config.clone();
            let messages = conversation.messages.clone();
            let started_at = Instant::now();
            let completion = with_retry(|| {
                let llm = llm.clone();
                let config = llm_config.clone();
                let messages = messages.clone();
                async move { llm.complete(&messages, &config).await }
            })
            .await?;
            let elapsed_ms = started_at.elapsed().as_millis() as u64;

            conversation.iterations += 1;
            conversation
                .messages
                .push(ChatMessage::assistant(completion.content.clone()));

            ctx.store.record_agent_iteration(&definition.id).await;
            ctx.store
                .update_task_stats(&task.id, |stats| {
                    stats.iterations += 1;
                    stats.duration_ms += elapsed_ms;
                    stats.prompt_tokens += completion.usage.prompt_tokens;
                    stats.completion_tokens += completion.usage.completion_tokens;
                })
                .await?;

            let step: ReactStep = match serde_json::from_str(&completion.content) {
                Ok(step) => step,
                Err(parse_err) => {
                    conversation.messages.push(ChatMessage::user(format!(
                        "Your last response did not match the required JSON shape ({parse_err}). \
                         Respond again with exactly one valid JSON object."
                    )));
                    continue;
                }
            };

            match step {
                ReactStep::SelfQuestion { question } => {
                    ctx.store
                        .set_agent_status(
                            &definition.id,
                            Some(task.id.clone()),
                            AgentStatus::SelfQuestion,
                            Some(serde_json::json!({ "question": question })),
                        )
                        .await?;
                    conversation
                        .messages
                        .push(ChatMessage::user("Continue reasoning toward a final answer."));
                }
                ReactStep::Thought {
                    content,
                    action: Some(action),
                } => {
                    ctx.store
                        .set_agent_status(
                            &definition.id,
                            Some(task.id.clone()),
                            AgentStatus::UsingTool,
                            Some(serde_json::json!({ "thought": content, "tool": action.tool })),
                        )
                        .await?;

                    let observation = match ctx.tools.get(&action.tool) {
                        None => serde_json::json!({
                            "type": "TOOL_NOT_EXIST",
                            "message": format!("no tool named '{}' is registered", action.tool),
                        }),
                        Some(tool) => match tool.validate_input(&action.input) {
                            Err(err) => serde_json::json!({
                                "type": "INVALID_TOOL_INPUT",
                                "message": err.to_string(),
                            }),
                            Ok(()) => match tool.invoke(action.input).await {
                                Ok(value) => value,
                                Err(err) => serde_json::json!({
                                    "type": "TOOL_ERROR_FEEDBACK",
                                    "message": err.to_string(),
                                }),
                            },
                        },
                    };

                    ctx.store
                        .set_agent_status(
                            &definition.id,
                            Some(task.id.clone()),
                            AgentStatus::Observing,
                            Some(observation.clone()),
                        )
                        .await?;

                    conversation.messages.push(ChatMessage::user(format!(
                        "Observation: {observation}"
                    )));
                }
                ReactStep::Thought { content, action: None } => {
                    conversation
                        .messages
                        .push(ChatMessage::user(format!(
                            "Noted: {content}. Continue toward a final answer or call a tool."
                        )));
                }
                ReactStep::FinalAnswer { content } => {
                    ctx.store
                        .set_agent_status(
                            &definition.id,
                            Some(task.id.clone()),
                            AgentStatus::TaskCompleted,
                            None,
                        )
                        .await?;
                    break Ok(TaskOutcome::Done(content));
                }
                ReactStep::BlockTask { reason } => {
                    break Ok(TaskOutcome::Blocked(reason));
                }
            }
        };

        match &outcome {
            Ok(TaskOutcome::Suspended) | Err(_) => {
                self.state.lock().await.insert(task.id.clone(), conversation);
            }
            _ => {}
        }

        outcome
    }
}
