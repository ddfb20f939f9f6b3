use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::AgentId;

/// Which execution strategy an agent runs under (design §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Think/act/observe bounded reasoning loop (§4.4).
    React,
    /// Delegates each task to a declarative sub-workflow collaborator (§4.5).
    WorkflowDriven,
}

/// Provider-agnostic chat completion tuning, passed straight through to the
/// configured `ChatCompletion` implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compatible".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }
}

/// Static definition of an agent: identity, prompt framing, the tools it may
/// call, and the runtime strategy it is executed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub background: String,
    pub kind: AgentKind,
    pub max_iterations: u32,
    pub tools: Vec<String>,
    pub llm_config: LlmConfig,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: String::new(),
            goal: String::new(),
            background: String::new(),
            kind,
            max_iterations: crate::constants::DEFAULT_MAX_ITERATIONS,
            tools: Vec::new(),
            llm_config: LlmConfig::default(),
            env: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.tools.extend(tools);
        self
    }
}

/// An agent's moment-to-moment activity, mirrored into the workflow log as
/// `AgentStatusUpdate` entries (design §4.1 / §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Thinking,
    SelfQuestion,
    UsingTool,
    Observing,
    Paused,
    Blocked,
    TaskCompleted,
    Errored,
}

/// Running per-agent execution counters, exposed through the cleaned-state
/// projection (design §3.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCounters {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_iterations: u64,
}
