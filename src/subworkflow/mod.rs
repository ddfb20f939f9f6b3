//! Reference sub-workflow collaborator for `WorkflowDriven` agents (design
//! §4.5.1).
//!
//! A `WorkflowDriven` agent hands each task off to something that knows how
//! to run a declarative process and report back whether it finished,
//! failed, or needs to suspend. `StepGraph` is this repo's reference
//! implementation of that collaborator: a named graph of steps, each one a
//! small async handler, grounded on the same `async_trait`-handler shape as
//! [`crate::tools::Tool`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, Result};

/// What a single step decided to do next.
pub enum StepTransition {
    /// Move to the named step, carrying forward an updated context.
    Next { step: String, context: Value },
    /// The sub-workflow is finished; carries the task's final result.
    Done { result: String },
    /// The sub-workflow cannot proceed; the owning task should be marked
    /// `BLOCKED`.
    Fail { reason: String },
}

/// One node in a [`StepGraph`].
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, context: Value) -> Result<StepTransition>;
}

/// Resumable cursor into a running sub-workflow: which step is next and
/// what context it should receive. Persisted by the owning
/// `WorkflowDrivenRuntime` across pause/resume, mirroring the ReAct
/// runtime's per-task conversation state.
#[derive(Debug, Clone)]
pub struct SubWorkflowState {
    pub current_step: String,
    pub context: Value,
}

/// The outcome of advancing a sub-workflow by zero or more steps.
pub enum StepOutcome {
    Done(String),
    Suspended(SubWorkflowState),
    Failed(String),
}

/// A declarative graph of named steps with no branching logic beyond what
/// each step itself decides. This is intentionally the simplest possible
/// collaborator satisfying the `WorkflowDriven` contract; a production
/// integration would swap in whatever external workflow engine it already
/// has.
pub struct StepGraph {
    start: String,
    steps: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepGraph {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            steps: HashMap::new(),
        }
    }

    pub fn add_step(&mut self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.steps.insert(name.into(), handler);
    }

    pub fn initial_state(&self, context: Value) -> SubWorkflowState {
        SubWorkflowState {
            current_step: self.start.clone(),
            context,
        }
    }

    /// Advances the graph from `state` until it suspends (cancellation
    /// requested), finishes, or fails. Each step transition is one
    /// cancellation point.
    pub async fn run_from(
        &self,
        mut state: SubWorkflowState,
        cancellation: &CancellationToken,
    ) -> Result<StepOutcome> {
        loop {
            if cancellation.is_cancelled() {
                return Ok(StepOutcome::Suspended(state));
            }

            let handler = self.steps.get(&state.current_step).ok_or_else(|| {
                OrchestratorError::SubWorkflowFailure(format!(
                    "no such step: {}",
                    state.current_step
                ))
            })?;

            match handler.run(state.context.clone()).await? {
                StepTransition::Next { step, context } => {
                    state = SubWorkflowState {
                        current_step: step,
                        context,
                    };
                }
                StepTransition::Done { result } => return Ok(StepOutcome::Done(result)),
                StepTransition::Fail { reason } => return Ok(StepOutcome::Failed(reason)),
            }
        }
    }
}
