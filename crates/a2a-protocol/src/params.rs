//! Request param / result shapes for the JSON-RPC method table.
//! Kept separate from [`crate::jsonrpc`]'s transport envelope so each method
//! handler deserializes exactly the params it expects.

use serde::{Deserialize, Serialize};

use a2a_core::types::{ListFilter, Message, PushNotificationConfig, SortField, Task, TaskState};

#[derive(Debug, Clone, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksParams {
    pub state: Option<TaskState>,
    pub context_id: Option<String>,
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: i64,
}

impl From<ListTasksParams> for ListFilter {
    fn from(p: ListTasksParams) -> Self {
        ListFilter {
            state: p.state,
            context_id: p.context_id,
            sort_by: p.sort_by,
            offset: p.offset,
            limit: p.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPushNotificationConfigParams {
    pub task_id: String,
    pub config: PushNotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPushNotificationConfigParams {
    pub task_id: String,
    pub config_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPushNotificationConfigParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletePushNotificationConfigParams {
    pub task_id: String,
    pub config_id: String,
}
