//! Tool trait and registry bound to ReAct agents.
//!
//! Grounded on the teacher's `Agent` trait shape in `agents/mod.rs`
//! (`async_trait`, a `name`/`description` pair, an async `execute`), applied
//! here to individually-invocable tools rather than whole agents, and
//! collected into a registry the way `agent_registry.rs` collects agents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// A named capability an agent's `Action` step can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Checks `input` against whatever shape this tool expects, before
    /// `invoke` ever runs, so a malformed call can be coached back to the
    /// agent (`INVALID_TOOL_INPUT`) distinctly from an execution failure
    /// (`TOOL_ERROR_FEEDBACK`). Tools with no declared shape accept anything.
    fn validate_input(&self, _input: &Value) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, input: Value) -> Result<Value>;
}

/// Holds every tool available to the runtime, keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| OrchestratorError::ToolInvocation {
                tool: name.to_string(),
                message: "no such tool registered".to_string(),
            })?;
        tool.invoke(input).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

/// A trivial tool useful for tests and demos: echoes its input back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the given input unchanged."
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_invokes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry
            .invoke("echo", serde_json::json!({"hello": "world"}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn registry_errors_on_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", Value::Null).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolInvocation { .. }));
    }
}
