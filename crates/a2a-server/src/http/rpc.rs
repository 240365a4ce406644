//! The single JSON-RPC 2.0 POST endpoint: one handler dispatches
//! every method in the table, `message/stream` diverging into an SSE
//! response instead of a plain JSON one.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use a2a_agent::events::{consolidate, AgentEvent};
use a2a_core::error::{A2aError, Result};
use a2a_core::types::{Message, Task, TaskState};
use a2a_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND};
use a2a_protocol::methods::*;
use a2a_protocol::params::*;
use a2a_toolbox::InvocationContext;

use crate::app::AppState;

pub async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    let id = req.id.clone();

    match req.method.as_str() {
        MESSAGE_SEND => respond(id.clone(), handle_message_send(&state, id, req.params).await),
        MESSAGE_STREAM => handle_message_stream(state, id, req.params).await,
        TASKS_GET => respond(id.clone(), handle_tasks_get(&state, req.params).await),
        TASKS_LIST => respond(id.clone(), handle_tasks_list(&state, req.params).await),
        TASKS_CANCEL => respond(id.clone(), handle_tasks_cancel(&state, req.params).await),
        PUSH_NOTIFICATION_CONFIG_SET => {
            respond(id.clone(), handle_push_config_set(&state, req.params))
        }
        PUSH_NOTIFICATION_CONFIG_GET => {
            respond(id.clone(), handle_push_config_get(&state, req.params))
        }
        PUSH_NOTIFICATION_CONFIG_LIST => {
            respond(id.clone(), handle_push_config_list(&state, req.params))
        }
        PUSH_NOTIFICATION_CONFIG_DELETE => {
            respond(id.clone(), handle_push_config_delete(&state, req.params))
        }
        AGENT_GET_AUTHENTICATED_EXTENDED_CARD => {
            respond(id.clone(), handle_extended_card(&state))
        }
        other => Json(JsonRpcResponse::err(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        ))
        .into_response(),
    }
}

fn respond<T: serde::Serialize>(id: Value, result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(JsonRpcResponse::ok(id, value)).into_response(),
        Err(e) => Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response(),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| A2aError::Validation(format!("invalid params: {e}")))
}

fn request_id_of(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => Uuid::new_v4().to_string(),
        other => other.to_string(),
    }
}

async fn handle_message_send(state: &AppState, id: Value, params: Option<Value>) -> Result<Task> {
    let params: MessageSendParams = parse_params(params)?;
    let (context_id, message) = prepare_message(params.message)?;

    if let Some(rejected) = check_backpressure(state, &context_id, message.clone()).await? {
        return Ok(rejected);
    }

    state
        .manager
        .create_task(&context_id, message, request_id_of(&id))
        .await
}

/// Assigns a context id if the caller didn't supply one and validates the
/// message's parts.
fn prepare_message(mut message: Message) -> Result<(String, Message)> {
    message.validate()?;
    let context_id = message
        .context_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    message.context_id = Some(context_id.clone());
    Ok((context_id, message))
}

/// Backpressure: when the queue is bounded and already full,
/// the task is rejected straight into `failed` instead of being queued.
/// Returns `Some(rejected_task)` when that happened.
async fn check_backpressure(
    state: &AppState,
    context_id: &str,
    message: Message,
) -> Result<Option<Task>> {
    let max_size = state.config.queue.max_size;
    if max_size == 0 {
        return Ok(None);
    }
    if state.storage.queue_length().await? >= max_size {
        return Ok(Some(state.manager.reject_for_queue_full(context_id, message).await?));
    }
    Ok(None)
}

async fn handle_tasks_get(state: &AppState, params: Option<Value>) -> Result<Task> {
    let params: TaskIdParams = parse_params(params)?;
    state
        .manager
        .get_task(&params.id)
        .await?
        .ok_or_else(|| A2aError::NotFound(format!("task {} not found", params.id)))
}

async fn handle_tasks_list(state: &AppState, params: Option<Value>) -> Result<TaskList> {
    let params: ListTasksParams = parse_params(params)?;
    let tasks = state.manager.list_tasks(params.into()).await?;
    Ok(TaskList { tasks })
}

async fn handle_tasks_cancel(state: &AppState, params: Option<Value>) -> Result<Task> {
    let params: TaskIdParams = parse_params(params)?;
    state.manager.cancel_task(&params.id).await
}

fn handle_push_config_set(
    state: &AppState,
    params: Option<Value>,
) -> Result<a2a_core::types::PushNotificationConfig> {
    let params: SetPushNotificationConfigParams = parse_params(params)?;
    state
        .manager
        .set_push_notification_config(&params.task_id, params.config.clone());
    Ok(params.config)
}

fn handle_push_config_get(
    state: &AppState,
    params: Option<Value>,
) -> Result<a2a_core::types::PushNotificationConfig> {
    let params: GetPushNotificationConfigParams = parse_params(params)?;
    state
        .manager
        .get_push_notification_configs(&params.task_id)
        .into_iter()
        .find(|c| c.id == params.config_id)
        .ok_or_else(|| A2aError::NotFound(format!("push config {} not found", params.config_id)))
}

fn handle_push_config_list(
    state: &AppState,
    params: Option<Value>,
) -> Result<Vec<a2a_core::types::PushNotificationConfig>> {
    let params: ListPushNotificationConfigParams = parse_params(params)?;
    Ok(state.manager.get_push_notification_configs(&params.task_id))
}

fn handle_push_config_delete(state: &AppState, params: Option<Value>) -> Result<Value> {
    let params: DeletePushNotificationConfigParams = parse_params(params)?;
    state
        .manager
        .delete_push_notification_config(&params.task_id, &params.config_id);
    Ok(Value::Null)
}

fn handle_extended_card(state: &AppState) -> Result<a2a_protocol::agent_card::AgentCard> {
    if !state.agent_card.supports_authenticated_extended_card {
        return Err(A2aError::NotFound(
            "this agent does not support an authenticated extended card".into(),
        ));
    }
    Ok(state.agent_card.clone())
}

/// `message/stream`: runs the agent loop directly against this request
/// (bypassing the FIFO queue — there is no transport in scope to bridge the
/// processor's background execution back to this HTTP response) and relays
/// every [`AgentEvent`] as an SSE frame as it is produced, finalizing the
/// backing task's state once the run completes. State is cloned into the
/// spawned tasks via `Arc`.
async fn handle_message_stream(state: Arc<AppState>, id: Value, params: Option<Value>) -> Response {
    let params: MessageSendParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response(),
    };

    let (context_id, message) = match prepare_message(params.message) {
        Ok(v) => v,
        Err(e) => return Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response(),
    };

    match check_backpressure(&state, &context_id, message.clone()).await {
        Ok(Some(rejected)) => return Json(JsonRpcResponse::ok(id, rejected)).into_response(),
        Ok(None) => {}
        Err(e) => return Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response(),
    }

    let mut task = Task::new(&context_id, TaskState::Working);
    task.history = match state.manager.get_context_history(&context_id).await {
        Ok(mut seeded) => {
            seeded.push(message);
            state.manager.trim_to_history_cap(&mut seeded);
            seeded
        }
        Err(e) => return Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response(),
    };
    if let Err(e) = state.storage.create_active(task.clone()).await {
        return Json(JsonRpcResponse::from_a2a_error(id, &e)).into_response();
    }

    let task_id = task.id.clone();
    let cancel = state.manager.register_cancel(&task_id);
    let history = task.history.clone();
    let ctx = InvocationContext {
        task_id: task_id.clone(),
        context_id: context_id.clone(),
    };

    let (internal_tx, mut internal_rx) = mpsc::channel::<AgentEvent>(64);
    let agent_handle = {
        let agent = state.agent.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { agent.run_with_stream(history, &ctx, &cancel, internal_tx).await })
    };

    let (out_tx, out_rx) = mpsc::channel::<AgentEvent>(64);
    tokio::spawn({
        let manager = state.manager.clone();
        let task_id = task_id.clone();
        async move {
            let mut events = Vec::new();
            while let Some(event) = internal_rx.recv().await {
                events.push(event.clone());
                if out_tx.send(event).await.is_err() {
                    // SSE client disconnected — keep draining so the agent
                    // loop (and our bookkeeping below) still finishes.
                }
            }

            match agent_handle.await {
                Ok(Ok(())) => {
                    if let Some(consolidated) = consolidate(&events) {
                        let final_state = if consolidated.input_required {
                            TaskState::InputRequired
                        } else {
                            TaskState::Completed
                        };
                        if let Err(e) = manager
                            .update_task(&task_id, final_state, Some(consolidated.message))
                            .await
                        {
                            warn!(error = %e, "failed to finalize streamed task");
                        }
                    }
                }
                Ok(Err(e)) => {
                    let message = Message::assistant_text(e.to_string());
                    if let Err(e) = manager.update_task(&task_id, TaskState::Failed, Some(message)).await {
                        warn!(error = %e, "failed to mark streamed task failed");
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "agent stream task panicked");
                    let message = Message::assistant_text("internal error: agent run panicked");
                    let _ = manager.update_task(&task_id, TaskState::Failed, Some(message)).await;
                }
            }
            manager.unregister_cancel(&task_id);
        }
    });

    sse_response(out_rx)
}

fn sse_response(
    mut rx: mpsc::Receiver<AgentEvent>,
) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let json = serde_json::to_string(&event_to_json(&event)).unwrap_or_else(|_| "null".to_string());
            yield Ok::<Event, Infallible>(Event::default().data(json));
        }
        yield Ok::<Event, Infallible>(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn event_to_json(event: &AgentEvent) -> Value {
    let name = event.name();
    let data = match event {
        AgentEvent::RunStarted => serde_json::json!({}),
        AgentEvent::IterationStarted { iteration } => serde_json::json!({ "iteration": iteration }),
        AgentEvent::MessageDelta { message } => serde_json::json!({ "message": message }),
        AgentEvent::ToolCall { name, id, input } => {
            serde_json::json!({ "name": name, "id": id, "input": input })
        }
        AgentEvent::ToolResult { name, id, output, is_error } => {
            serde_json::json!({ "name": name, "id": id, "output": output, "is_error": is_error })
        }
        AgentEvent::InputRequired { message } => serde_json::json!({ "message": message }),
        AgentEvent::RunCompleted { message } => serde_json::json!({ "message": message }),
        AgentEvent::RunFailed { error } => serde_json::json!({ "error": error }),
    };
    serde_json::json!({ "event": name, "data": data })
}
