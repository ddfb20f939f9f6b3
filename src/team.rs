//! `Team`: the top-level handle an embedder constructs and drives.
//!
//! Grounded on the teacher's `AgentOrchestrator::new`, which wired together
//! the task queue, status manager, and registered agents behind one
//! constructor; `Team::new` does the analogous wiring for the state store,
//! task queue policy, and agent runtimes, then hands back a
//! [`WorkflowController`] as the object callers actually interact with.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::AgentRuntime;
use crate::agents::react::ReactRuntime;
use crate::config::OrchestratorConfig;
use crate::llm::{ChatCompletion, HttpChatProvider};
use crate::models::AgentKind;
use crate::state_store::StateStore;
use crate::tools::ToolRegistry;
use crate::workflow::WorkflowController;

/// Builds a [`WorkflowController`] for one team, defaulting the
/// `WorkflowDriven` runtime slot to whatever the caller supplies (there is
/// no sensible built-in default sub-workflow collaborator) while always
/// wiring up a [`ReactRuntime`] for `React` agents.
pub struct Team;

impl Team {
    /// Constructs a controller backed by an HTTP chat-completions provider
    /// configured from `config`, a fresh [`ReactRuntime`], the given tool
    /// registry, and any additional runtimes (typically a `WorkflowDriven`
    /// entry) supplied by the caller.
    pub fn new(
        team_id: impl Into<String>,
        config: &OrchestratorConfig,
        tools: ToolRegistry,
        extra_runtimes: HashMap<AgentKind, Arc<dyn AgentRuntime>>,
    ) -> WorkflowController {
        let store = Arc::new(StateStore::new(team_id));
        let llm: Arc<dyn ChatCompletion> = Arc::new(HttpChatProvider::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            std::time::Duration::from_secs(config.llm_timeout_secs),
        ));

        let mut runtimes = extra_runtimes;
        runtimes
            .entry(AgentKind::React)
            .or_insert_with(|| Arc::new(ReactRuntime::new()));

        WorkflowController::new(store, config.max_parallel_tasks, llm, tools, runtimes)
    }
}
