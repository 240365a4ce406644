//! The agent execution loop: bounded chat-completion iterations
//! with tool dispatch, in a polling (`run`) and a streaming
//! (`run_with_stream`) variant sharing the same control structure.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use a2a_core::error::{A2aError, Result};
use a2a_core::types::{Message, MessageKind, Part, Role};
use a2a_toolbox::{InvocationContext, ToolBox, INPUT_REQUIRED_TOOL_NAME};

use crate::accumulator::ToolCallAccumulator;
use crate::client::{BackendMessage, BackendRole, ChatCompletionRequest, LlmClient};
use crate::converter::{from_backend, to_backend, tool_result_message};
use crate::events::{chunk_message_id, AgentEvent};

/// Default iteration cap: a small double-digit bound on runaway agents.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Result of one polling `run` call.
pub struct AgentOutcome {
    pub response_message: Message,
    pub additional_messages: Vec<Message>,
}

pub struct AgentLoop {
    client: Arc<dyn LlmClient>,
    toolbox: Arc<ToolBox>,
    model: String,
    system_prompt: Option<String>,
    max_iterations: usize,
}

impl AgentLoop {
    pub fn new(client: Arc<dyn LlmClient>, toolbox: Arc<ToolBox>, model: impl Into<String>) -> Self {
        Self {
            client,
            toolbox,
            model: model.into(),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn initial_conv(&self, history: &[Message]) -> Vec<BackendMessage> {
        let mut conv: Vec<BackendMessage> = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            conv.push(BackendMessage::new(BackendRole::System, prompt.clone()));
        }
        conv.extend(history.iter().map(to_backend));
        conv
    }

    /// Polling mode: drive the loop to completion (or a paused/failed
    /// state) and return the final outcome in one call.
    #[instrument(skip(self, history, ctx, cancel), fields(task_id = %ctx.task_id))]
    pub async fn run(
        &self,
        history: Vec<Message>,
        ctx: &InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome> {
        let mut conv = self.initial_conv(&history);
        let mut additional_messages = Vec::new();
        let tool_definitions = self.toolbox.definitions();

        for iteration in 0..self.max_iterations {
            if cancel.is_cancelled() {
                return Err(A2aError::Canceled);
            }

            debug!(iteration, "agent loop iteration");

            let req = ChatCompletionRequest {
                model: self.model.clone(),
                messages: conv.clone(),
                tools: tool_definitions.clone(),
            };

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(A2aError::Canceled),
                result = self.client.create_chat_completion(&req) => {
                    result.map_err(|e| A2aError::BackendUnavailable(e.to_string()))?
                }
            };

            let Some(choice) = response.choices.into_iter().next() else {
                return Err(A2aError::Internal("no choices".into()));
            };

            conv.push(choice.message.clone());
            let assistant_message = from_backend(&choice.message);

            let tool_calls = choice.message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() || self.toolbox.names().is_empty() {
                info!(iteration, "agent loop complete — final assistant message");
                return Ok(AgentOutcome {
                    response_message: assistant_message,
                    additional_messages,
                });
            }

            additional_messages.push(assistant_message);

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    return Err(A2aError::Canceled);
                }

                let input: Value = serde_json::from_str(&call.function.arguments)
                    .map_err(|e| A2aError::ToolFailure(format!("invalid tool arguments: {e}")))?;

                if call.function.name == INPUT_REQUIRED_TOOL_NAME {
                    let prompt = input
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("additional input is required")
                        .to_string();
                    return Ok(AgentOutcome {
                        response_message: input_required_message(prompt),
                        additional_messages,
                    });
                }

                let invocation_ctx = InvocationContext {
                    task_id: ctx.task_id.clone(),
                    context_id: ctx.context_id.clone(),
                };
                let result = self.toolbox.execute(&call.function.name, input, &invocation_ctx).await;
                let output = if result.is_error {
                    format!("Tool execution failed: {}", result.content)
                } else {
                    result.content
                };

                conv.push(BackendMessage {
                    role: BackendRole::Tool,
                    content: output.clone(),
                    tool_call_id: Some(call.id.clone()),
                    tool_name: Some(call.function.name.clone()),
                    tool_calls: None,
                    reasoning: None,
                });
                additional_messages.push(tool_result_message(&call.id, &call.function.name, &output));
            }
        }

        Err(A2aError::IterationExhausted(format!(
            "maximum iterations ({}) reached",
            self.max_iterations
        )))
    }

    /// Streaming mode: emit a sequence of [`AgentEvent`]s through `tx` as the
    /// loop progresses. Returns once a terminal event has been sent (or an
    /// error occurs sending one).
    #[instrument(skip(self, history, ctx, cancel, tx), fields(task_id = %ctx.task_id))]
    pub async fn run_with_stream(
        &self,
        history: Vec<Message>,
        ctx: &InvocationContext,
        cancel: &CancellationToken,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let mut conv = self.initial_conv(&history);
        let tool_definitions = self.toolbox.definitions();
        let mut chunk_seq: u64 = 0;

        if tx.send(AgentEvent::RunStarted).await.is_err() {
            return Ok(());
        }

        for iteration in 0..self.max_iterations {
            if cancel.is_cancelled() {
                let _ = tx.send(AgentEvent::RunFailed {
                    error: A2aError::Canceled.to_string(),
                }).await;
                return Err(A2aError::Canceled);
            }

            if tx
                .send(AgentEvent::IterationStarted { iteration })
                .await
                .is_err()
            {
                return Ok(());
            }

            let req = ChatCompletionRequest {
                model: self.model.clone(),
                messages: conv.clone(),
                tools: tool_definitions.clone(),
            };

            let (delta_tx, mut delta_rx) = mpsc::channel(64);
            let stream_result = {
                let client = self.client.clone();
                let req = req.clone();
                tokio::spawn(async move { client.create_chat_completion_stream(&req, delta_tx).await })
            };

            let mut content = String::new();
            let mut accumulator = ToolCallAccumulator::new();
            let mut finish_reason = None;

            loop {
                let delta = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(AgentEvent::RunFailed {
                            error: A2aError::Canceled.to_string(),
                        }).await;
                        return Err(A2aError::Canceled);
                    }
                    delta = delta_rx.recv() => delta,
                };
                let Some(delta) = delta else { break };

                if let Some(text) = &delta.content {
                    if !text.is_empty() {
                        content.push_str(text);
                        chunk_seq += 1;
                        let event = AgentEvent::MessageDelta {
                            message: chunk_message(chunk_seq, text),
                        };
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                for tc in &delta.tool_calls {
                    accumulator.feed(tc);
                }
                if delta.finish_reason.is_some() {
                    finish_reason = delta.finish_reason.clone();
                }
            }

            match stream_result.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = tx
                        .send(AgentEvent::RunFailed { error: e.to_string() })
                        .await;
                    return Err(A2aError::BackendUnavailable(e.to_string()));
                }
                Err(e) => {
                    let _ = tx
                        .send(AgentEvent::RunFailed { error: e.to_string() })
                        .await;
                    return Err(A2aError::Internal(e.to_string()));
                }
            }

            let tool_calls = accumulator.finish();

            let assistant_backend = BackendMessage {
                role: BackendRole::Assistant,
                content: content.clone(),
                tool_call_id: None,
                tool_name: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|c| crate::client::BackendToolCall {
                                id: c.id.clone(),
                                kind: "function".to_string(),
                                function: crate::client::BackendFunctionCall {
                                    name: c.name.clone(),
                                    arguments: c.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                reasoning: None,
            };
            conv.push(assistant_backend);

            let is_tool_use = finish_reason.as_deref() == Some("tool_calls") || !tool_calls.is_empty();

            if !is_tool_use || self.toolbox.names().is_empty() {
                let message = Message {
                    kind: MessageKind::Message,
                    message_id: format!("assistant-{chunk_seq}"),
                    role: Role::Assistant,
                    context_id: None,
                    parts: vec![Part::text(content)],
                };
                let _ = tx.send(AgentEvent::RunCompleted { message }).await;
                return Ok(());
            }

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    let _ = tx
                        .send(AgentEvent::RunFailed {
                            error: A2aError::Canceled.to_string(),
                        })
                        .await;
                    return Err(A2aError::Canceled);
                }

                let input: Value = match serde_json::from_str(&call.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        let error = format!("invalid tool arguments: {e}");
                        let _ = tx.send(AgentEvent::RunFailed { error: error.clone() }).await;
                        return Err(A2aError::ToolFailure(error));
                    }
                };

                if call.name == INPUT_REQUIRED_TOOL_NAME {
                    let prompt = input
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("additional input is required")
                        .to_string();
                    let message = input_required_message(prompt);
                    let _ = tx.send(AgentEvent::InputRequired { message }).await;
                    return Ok(());
                }

                let _ = tx
                    .send(AgentEvent::ToolCall {
                        name: call.name.clone(),
                        id: call.id.clone(),
                        input: input.clone(),
                    })
                    .await;

                let invocation_ctx = InvocationContext {
                    task_id: ctx.task_id.clone(),
                    context_id: ctx.context_id.clone(),
                };
                let result = self.toolbox.execute(&call.name, input, &invocation_ctx).await;
                let output = if result.is_error {
                    format!("Tool execution failed: {}", result.content)
                } else {
                    result.content.clone()
                };

                let _ = tx
                    .send(AgentEvent::ToolResult {
                        name: call.name.clone(),
                        id: call.id.clone(),
                        output: output.clone(),
                        is_error: result.is_error,
                    })
                    .await;

                conv.push(BackendMessage {
                    role: BackendRole::Tool,
                    content: output,
                    tool_call_id: Some(call.id.clone()),
                    tool_name: Some(call.name.clone()),
                    tool_calls: None,
                    reasoning: None,
                });
            }
        }

        let error = format!("maximum iterations ({}) reached", self.max_iterations);
        let _ = tx.send(AgentEvent::RunFailed { error: error.clone() }).await;
        Err(A2aError::IterationExhausted(error))
    }
}

fn chunk_message(seq: u64, text: &str) -> Message {
    Message {
        kind: MessageKind::Message,
        message_id: chunk_message_id(seq),
        role: Role::Assistant,
        context_id: None,
        parts: vec![Part::text(text)],
    }
}

fn input_required_message(prompt: String) -> Message {
    Message {
        kind: MessageKind::InputRequired,
        message_id: uuid::Uuid::new_v4().to_string(),
        role: Role::Assistant,
        context_id: None,
        parts: vec![Part::text(prompt)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatChoice, ChatCompletionResponse, ProviderError};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<ChatCompletionResponse>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_chat_completion(
            &self,
            _req: &ChatCompletionRequest,
        ) -> std::result::Result<ChatCompletionResponse, ProviderError> {
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Err(ProviderError::Unavailable("exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn final_response(text: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            choices: vec![ChatChoice {
                message: BackendMessage::new(BackendRole::Assistant, text),
                finish_reason: Some("stop".to_string()),
            }],
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext {
            task_id: "t-1".into(),
            context_id: "c-1".into(),
        }
    }

    #[tokio::test]
    async fn simple_completion_returns_final_message_with_no_tool_calls() {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(vec![final_response("hello")]),
        });
        let agent = AgentLoop::new(client, Arc::new(ToolBox::new()), "gpt-4o");
        let cancel = CancellationToken::new();

        let outcome = agent
            .run(vec![Message::user_text("hi")], &ctx(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.response_message.text_content(), "hello");
        assert!(outcome.additional_messages.is_empty());
    }

    #[tokio::test]
    async fn empty_choices_is_an_internal_error() {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(vec![ChatCompletionResponse { choices: vec![] }]),
        });
        let agent = AgentLoop::new(client, Arc::new(ToolBox::new()), "gpt-4o");
        let cancel = CancellationToken::new();

        let result = agent.run(vec![Message::user_text("hi")], &ctx(), &cancel).await;
        assert!(matches!(result, Err(A2aError::Internal(_))));
    }

    #[tokio::test]
    async fn iteration_cap_is_reported_when_tool_calls_never_stop() {
        let mut toolbox = ToolBox::new();
        toolbox.add(Box::new(a2a_toolbox::InputRequiredTool));
        // A different tool so the loop doesn't short-circuit on input_required.
        struct LoopingTool;
        #[async_trait]
        impl a2a_toolbox::Tool for LoopingTool {
            fn name(&self) -> &str {
                "loop_tool"
            }
            fn description(&self) -> &str {
                "loops"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(
                &self,
                _input: serde_json::Value,
                _ctx: &InvocationContext,
            ) -> a2a_toolbox::ToolResult {
                a2a_toolbox::ToolResult::success("ok")
            }
        }
        toolbox.add(Box::new(LoopingTool));

        let call_response = ChatCompletionResponse {
            choices: vec![ChatChoice {
                message: BackendMessage {
                    role: BackendRole::Assistant,
                    content: String::new(),
                    tool_call_id: None,
                    tool_name: None,
                    tool_calls: Some(vec![crate::client::BackendToolCall {
                        id: "call_1".into(),
                        kind: "function".into(),
                        function: crate::client::BackendFunctionCall {
                            name: "loop_tool".into(),
                            arguments: "{}".into(),
                        },
                    }]),
                    reasoning: None,
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
        };

        let responses = (0..2).map(|_| call_response.clone()).collect();
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(responses),
        });
        let agent = AgentLoop::new(client, Arc::new(toolbox), "gpt-4o").with_max_iterations(2);
        let cancel = CancellationToken::new();

        let result = agent.run(vec![Message::user_text("go")], &ctx(), &cancel).await;
        match result {
            Err(A2aError::IterationExhausted(msg)) => {
                assert!(msg.contains("maximum iterations (2) reached"));
            }
            other => panic!("expected IterationExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_any_llm_call() {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(vec![final_response("unused")]),
        });
        let agent = AgentLoop::new(client, Arc::new(ToolBox::new()), "gpt-4o");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = agent.run(vec![Message::user_text("hi")], &ctx(), &cancel).await;
        assert!(matches!(result, Err(A2aError::Canceled)));
    }
}
