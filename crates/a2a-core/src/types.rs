//! The protocol data model: parts, messages, tasks, and the task state
//! machine.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{A2aError, Result};

/// One typed payload inside a message's ordered `parts` sequence.
///
/// Parsers accept both the typed-struct form below and a bare map form on
/// input (protocol compatibility); they always emit the typed-struct form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    File { file: FileContent },
    Data { data: serde_json::Map<String, Value> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn data(data: serde_json::Map<String, Value>) -> Self {
        Part::Data { data }
    }

    /// A part must carry a `kind`; text parts require `text`; data parts
    /// require a non-empty `data` map.
    pub fn validate(&self) -> Result<()> {
        match self {
            Part::Text { text } if text.is_empty() => {
                // Empty text is allowed (e.g. the "always emit at least one
                // part" rule in the converter can produce one) — only
                // missing `text` at the wire level is rejected, and serde
                // already enforces that the field is present.
                let _ = text;
                Ok(())
            }
            Part::Text { .. } => Ok(()),
            Part::File { file } => {
                if file.name.is_empty() {
                    return Err(A2aError::Validation("file part requires a name".into()));
                }
                Ok(())
            }
            Part::Data { data } => {
                if data.is_empty() {
                    return Err(A2aError::Validation(
                        "data part requires a non-empty data map".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileContent {
    pub name: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Role a message is attributed to in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    /// Unknown roles map to `user` per the converter's mapping rules.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Message,
    InputRequired,
}

/// A role-bearing message whose payload is an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub message_id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            kind: MessageKind::Message,
            message_id: Uuid::new_v4().to_string(),
            role,
            context_id: None,
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Concatenation of every text part's content, in order.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn validate(&self) -> Result<()> {
        for part in &self.parts {
            part.validate()?;
        }
        Ok(())
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    /// Reserved for a future authenticated-tool flow; reachable only as a
    /// cancel-table "from" state in this crate, never produced by a
    /// transition it implements itself.
    AuthRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
        )
    }

    /// Any state a `cancel_task` call may legally act upon.
    pub fn is_cancelable(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input_required",
            TaskState::AuthRequired => "auth_required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            TaskState::Rejected => "rejected",
            TaskState::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Validate one state transition against the task lifecycle. Terminal
/// states have no successors; `input_required -> working` is the one
/// "backwards" edge allowed. A transition to the same state it's already in
/// is always a no-op success — including for terminal states — so that
/// `update(id, S, nil)` is idempotent for any legal `S`.
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<()> {
    use TaskState::*;

    if from == to {
        return Ok(());
    }

    if from.is_terminal() {
        return Err(A2aError::illegal_transition(from, to));
    }

    let allowed = matches!(
        (from, to),
        (Submitted, Working)
            | (Working, Completed)
            | (Working, Failed)
            | (Working, InputRequired)
            | (InputRequired, Working)
            | (Submitted, Canceled)
            | (Working, Canceled)
            | (InputRequired, Canceled)
            | (AuthRequired, Canceled)
            | (Unknown, Canceled)
    );

    if allowed {
        Ok(())
    } else {
        Err(A2aError::illegal_transition(from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// One artifact produced by a task (file content, generated data, a URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
}

/// A unit of work identified by id, scoped to a context, carrying a message
/// history and a state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub history: Vec<Message>,
    pub artifacts: Vec<Artifact>,
}

impl Task {
    pub fn new(context_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            kind: "task".to_string(),
            status: TaskStatus::new(state),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// A task waiting in the FIFO queue plus the originating request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: Task,
    pub request_id: String,
}

/// Aggregate storage statistics`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageStats {
    pub total: usize,
    pub by_state: std::collections::HashMap<TaskState, usize>,
    pub contexts: usize,
    pub avg_tasks_per_context: f64,
    pub total_messages: usize,
    pub avg_messages_per_context: f64,
}

/// Push-notification webhook configuration for a task (pass-through
/// persistence only — outbound delivery is not implemented).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotificationConfig {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,
}

/// Sort key for `list`/`list_by_context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    State,
    ContextId,
    Timestamp,
    Id,
}

/// Filter + pagination parameters for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<TaskState>,
    pub context_id: Option<String>,
    pub sort_by: Option<SortField>,
    pub offset: usize,
    /// `<= 0` means "all from offset".
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_allows_documented_edges() {
        assert!(validate_transition(TaskState::Submitted, TaskState::Working).is_ok());
        assert!(validate_transition(TaskState::Working, TaskState::Completed).is_ok());
        assert!(validate_transition(TaskState::Working, TaskState::InputRequired).is_ok());
        assert!(validate_transition(TaskState::InputRequired, TaskState::Working).is_ok());
        assert!(validate_transition(TaskState::Working, TaskState::Canceled).is_ok());
    }

    #[test]
    fn terminal_states_refuse_further_transitions() {
        assert!(validate_transition(TaskState::Completed, TaskState::Working).is_err());
        assert!(validate_transition(TaskState::Canceled, TaskState::Working).is_err());
        assert!(validate_transition(TaskState::Failed, TaskState::Canceled).is_err());
    }

    #[test]
    fn illegal_edge_is_rejected() {
        assert!(validate_transition(TaskState::Submitted, TaskState::Completed).is_err());
    }

    #[test]
    fn same_state_transition_is_always_idempotent() {
        assert!(validate_transition(TaskState::Completed, TaskState::Completed).is_ok());
        assert!(validate_transition(TaskState::Failed, TaskState::Failed).is_ok());
        assert!(validate_transition(TaskState::Canceled, TaskState::Canceled).is_ok());
        assert!(validate_transition(TaskState::Rejected, TaskState::Rejected).is_ok());
        assert!(validate_transition(TaskState::Working, TaskState::Working).is_ok());
    }

    #[test]
    fn data_part_requires_nonempty_map() {
        let part = Part::Data {
            data: serde_json::Map::new(),
        };
        assert!(part.validate().is_err());
    }

    #[test]
    fn text_content_concatenates_in_order() {
        let msg = Message::new(
            Role::User,
            vec![Part::text("hello "), Part::text("world")],
        );
        assert_eq!(msg.text_content(), "hello world");
    }
}
