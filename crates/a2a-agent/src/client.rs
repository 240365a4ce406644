//! The LLM chat-completion client boundary.
//!
//! The wire client itself (auth, retries, provider-specific quirks) is an
//! external collaborator — this module only defines the shape
//! the agent loop depends on ([`LlmClient`], [`ChatCompletionRequest`],
//! [`ChatCompletionResponse`]) plus one concrete OpenAI-compatible
//! implementation so the workspace runs end to end without a separate crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use a2a_toolbox::registry::ToolDefinition;

/// One message in backend chat-completion form: a role, a single content
/// string, and the optional fields that carry tool semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: BackendRole,
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool a `Role::Tool` message is the result of. Not sent
    /// to every provider's wire format, but carried so conversions back to
    /// the protocol (`from_backend`) can reconstruct it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<BackendToolCall>>,
    /// Provider-supplied reasoning/thinking text, carried separately from
    /// `content` so `from_backend` can emit it as its own `text` part
    /// instead of folding it into the main reply (§4.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl BackendMessage {
    pub fn new(role: BackendRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: None,
            reasoning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: BackendFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as emitted by the provider — parsed by the
    /// agent loop, not here.
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<BackendMessage>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone)]
pub struct ChatChoice {
    pub message: BackendMessage,
    pub finish_reason: Option<String>,
}

/// One incremental chunk of a streamed chat completion. Mirrors the
/// OpenAI-style delta shape: `content` carries incremental assistant text,
/// `tool_calls` carries partial tool-call fragments keyed by `index`.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<StreamToolCallDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Common interface for chat-completion backends. The agent loop depends
/// only on this trait, never on a concrete provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn create_chat_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Stream a chat completion. Default falls back to the non-streaming
    /// call and emits its content as a single delta, for providers that
    /// don't implement native streaming.
    async fn create_chat_completion_stream(
        &self,
        req: &ChatCompletionRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<(), ProviderError> {
        let resp = self.create_chat_completion(req).await?;
        let Some(choice) = resp.choices.into_iter().next() else {
            return Err(ProviderError::Parse("no choices in response".into()));
        };
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, tc)| StreamToolCallDelta {
                index,
                id: Some(tc.id),
                name: Some(tc.function.name),
                arguments: Some(tc.function.arguments),
            })
            .collect();
        let _ = tx
            .send(StreamDelta {
                content: Some(choice.message.content),
                tool_calls,
                finish_reason: choice.finish_reason,
            })
            .await;
        Ok(())
    }
}

/// Minimal OpenAI-compatible HTTP client. Works against the real OpenAI API
/// or any compatible endpoint reachable via `base_url` (local inference
/// servers, proxies).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiClient {
    pub fn new(provider_name: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            provider_name: provider_name.into(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [BackendMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

fn wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunction {
                name: &t.name,
                description: &t.description,
                parameters: &t.input_schema,
            },
        })
        .collect()
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: BackendMessage,
    finish_reason: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn create_chat_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let body = WireRequest {
            model: &req.model,
            messages: &req.messages,
            tools: wire_tools(&req.tools),
            stream: false,
        };

        debug!(model = %req.model, "sending chat completion request");

        let resp = self
            .http
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat completion API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let wire: WireResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(ChatCompletionResponse {
            choices: wire
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    message: c.message,
                    finish_reason: c.finish_reason,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic in-memory client for agent-loop tests: returns a fixed
    /// queue of responses in order, one per call.
    pub struct ScriptedClient {
        pub responses: tokio::sync::Mutex<Vec<ChatCompletionResponse>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_chat_completion(
            &self,
            _req: &ChatCompletionRequest,
        ) -> Result<ChatCompletionResponse, ProviderError> {
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Err(ProviderError::Unavailable("scripted responses exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    #[test]
    fn backend_message_serializes_without_optional_fields() {
        let msg = BackendMessage::new(BackendRole::User, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("tool_calls").is_none());
    }
}
