//! Provider-agnostic chat completion boundary.
//!
//! The teacher talks to its LLM through a CLI subprocess
//! (`claude_code/cli_client.rs`) behind a `circuit_breaker.rs` retry wrapper;
//! here the same shape — a narrow async trait plus an exponential-backoff
//! retry helper — is kept, but the transport is an HTTP chat-completions
//! endpoint via `reqwest`, since the design has no CLI to shell out to.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS};
use crate::error::{OrchestratorError, Result};
use crate::models::LlmConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting for one completion call, used to populate a task's
/// [`crate::models::TaskStats`] (design §3.1).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// The result of one completion call: the raw text the agent parses as a
/// [`crate::agents::react::ReactStep`], plus whatever usage accounting the
/// provider reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// A single chat completion call, abstracting over whichever provider an
/// agent is configured with. Implementations should treat a timeout or
/// transport failure as [`OrchestratorError::LlmProvider`], which the ReAct
/// loop treats as fatal to the current task (design §7).
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], config: &LlmConfig) -> Result<Completion>;

    /// Applies an environment patch (credential rotation, typically) so it
    /// is visible to the next call. `SetEnv`'s fan-out into the provider
    /// (design §4.3); providers with nothing to update may leave this as a
    /// no-op.
    fn apply_env(&self, _updates: &HashMap<String, String>) {}
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageWire>,
}

#[derive(Deserialize)]
struct UsageWire {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// An OpenAI-compatible `/chat/completions` HTTP provider, usable against
/// any self-hosted or vendor endpoint that speaks the same wire shape.
pub struct HttpChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: StdRwLock<Option<String>>,
}

impl HttpChatProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: StdRwLock::new(api_key),
        }
    }
}

#[async_trait]
impl ChatCompletion for HttpChatProvider {
    async fn complete(&self, messages: &[ChatMessage], config: &LlmConfig) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &config.model,
            messages,
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        };

        let mut request = self.client.post(&url).json(&body);
        let api_key = self.api_key.read().unwrap().clone();
        if let Some(key) = &api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::LlmProvider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::LlmProvider(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::LlmProvider(e.to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| Completion {
                content: c.message.content,
                usage,
            })
            .ok_or_else(|| OrchestratorError::LlmProvider("empty choices array".to_string()))
    }

    /// `SetEnv`'s fan-out into this provider: an updated `LLM_API_KEY`
    /// becomes the bearer token on every subsequent call.
    fn apply_env(&self, updates: &HashMap<String, String>) {
        if let Some(key) = updates.get("LLM_API_KEY") {
            *self.api_key.write().unwrap() = Some(key.clone());
        }
    }
}

/// Retries `f` with exponential backoff, matching the design's §7.1 retry
/// policy: a fixed attempt budget, doubling delay, and no retry once the
/// underlying error is judged fatal to the task.
pub async fn with_retry<T, F, Fut>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS);
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < DEFAULT_RETRY_ATTEMPTS && !err.is_fatal_to_task() => {
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_gives_up_after_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::ToolInvocation {
                tool: "x".into(),
                message: "boom".into(),
            }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_RETRY_ATTEMPTS + 1);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::LlmProvider("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn apply_env_rotates_the_bearer_token() {
        let provider = HttpChatProvider::new("http://127.0.0.1:0", None, Duration::from_secs(1));
        assert!(provider.api_key.read().unwrap().is_none());

        let mut updates = HashMap::new();
        updates.insert("LLM_API_KEY".to_string(), "sk-rotated".to_string());
        provider.apply_env(&updates);

        assert_eq!(
            provider.api_key.read().unwrap().as_deref(),
            Some("sk-rotated")
        );
    }
}
