//! # Conduct Core
//!
//! A multi-agent workflow orchestration engine: a dependency-aware task
//! queue admits work onto a pool of agents, each agent runs either a
//! think/act/observe reasoning loop against an LLM or delegates to a
//! declarative sub-workflow collaborator, and every state change is
//! recorded on a subscribable workflow log.
//!
//! ## Architecture
//!
//! - **State Store**: the single typed mutator surface for one team's
//!   tasks, agents, and workflow status.
//! - **Task Queue**: resolves which tasks are admissible given the current
//!   dependency graph and in-flight count.
//! - **Workflow Controller**: the Start/Pause/Resume/Stop/SetEnv surface,
//!   and the driver loop that dispatches admitted tasks to agent runtimes.
//! - **Agent Runtimes**: `ReactRuntime` for LLM-driven reasoning,
//!   `WorkflowDrivenRuntime` for sub-workflow delegation.
//! - **Log Stream**: the append-only, selector-gated workflow log.
//!
//! ## Usage
//!
//! Embedders construct a [`team::Team`] to obtain a
//! [`workflow::WorkflowController`], or run the optional HTTP surface in
//! [`api`] to drive the same operations remotely.

pub mod agents;
pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod llm;
pub mod log_stream;
pub mod models;
pub mod state_store;
pub mod subworkflow;
pub mod task_queue;
pub mod team;
pub mod tools;
pub mod workflow;

pub use error::{OrchestratorError, Result};
