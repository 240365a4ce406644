use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument};

use a2a_core::error::{A2aError, Result};
use a2a_core::types::{
    ListFilter, Message, PushNotificationConfig, SortField, Task, TaskState, TaskStatus,
};
use a2a_storage::Storage;

use crate::CancelRegistry;

/// Owns task lifecycle transitions on top of a [`Storage`] backend and the
/// [`CancelRegistry`] capability table. This is the only thing callers (the
/// RPC handlers, the processor, the agent loop) are meant to touch — nothing
/// upstream talks to `Storage` directly.
pub struct TaskManager {
    storage: Arc<dyn Storage>,
    cancel_registry: CancelRegistry,
    max_conversation_history: usize,
    /// Pass-through persistence for webhook configs, keyed by task id. Not
    /// delivered anywhere — delivery is unspecified (open question).
    push_configs: DashMap<String, Vec<PushNotificationConfig>>,
}

impl TaskManager {
    pub fn new(storage: Arc<dyn Storage>, max_conversation_history: usize) -> Self {
        Self {
            storage,
            cancel_registry: CancelRegistry::new(),
            max_conversation_history,
            push_configs: DashMap::new(),
        }
    }

    /// Create a new task in `submitted` state and enqueue it for processing.
    /// Seeds the new task's history with the last `max_conversation_history`
    /// messages already on record for `context_id` (spec §3/§4.2) before
    /// appending the triggering `message`.
    #[instrument(skip(self, message), fields(context_id))]
    pub async fn create_task(
        &self,
        context_id: &str,
        message: Message,
        request_id: String,
    ) -> Result<Task> {
        let mut history = self.get_context_history(context_id).await?;
        history.push(message);
        self.create_task_with_history(context_id, history, request_id)
            .await
    }

    /// The flattened, chronological union of `history` across every archived
    /// task in `context_id`, trimmed to `max_conversation_history` most
    /// recent messages. This is what a freshly created task in an existing
    /// context is seeded with.
    #[instrument(skip(self))]
    pub async fn get_context_history(&self, context_id: &str) -> Result<Vec<Message>> {
        if self.max_conversation_history == 0 {
            return Ok(Vec::new());
        }
        let filter = ListFilter {
            context_id: Some(context_id.to_string()),
            sort_by: Some(SortField::Timestamp),
            ..Default::default()
        };
        let mut tasks = self.storage.list_by_context(context_id, filter).await?;
        tasks.sort_by(|a, b| a.status.timestamp.cmp(&b.status.timestamp));

        let mut history: Vec<Message> = Vec::new();
        for task in tasks {
            history.extend(task.history);
        }
        self.trim_history(&mut history);
        Ok(history)
    }

    /// Create a new task seeded with an existing history (used when a
    /// context already has prior turns).
    #[instrument(skip(self, history), fields(context_id, turns = history.len()))]
    pub async fn create_task_with_history(
        &self,
        context_id: &str,
        history: Vec<Message>,
        request_id: String,
    ) -> Result<Task> {
        let mut task = Task::new(context_id, TaskState::Submitted);
        task.history = history;
        self.trim_history(&mut task.history);
        self.storage.enqueue(task.clone(), request_id).await?;
        debug!(task_id = %task.id, "task created and enqueued");
        Ok(task)
    }

    /// Backpressure path: the queue is bounded and already at
    /// capacity, so the task never queues — it is created straight into
    /// `failed` with the standard queue-full message and archived.
    #[instrument(skip(self, message), fields(context_id))]
    pub async fn reject_for_queue_full(&self, context_id: &str, message: Message) -> Result<Task> {
        let mut task = Task::new(context_id, TaskState::Failed);
        let reject_message = Message::assistant_text("Task queue is full. Please try again later.");
        task.history = vec![message, reject_message.clone()];
        self.trim_history(&mut task.history);
        task.status.message = Some(reject_message);
        self.storage.archive(task.clone()).await?;
        Ok(task)
    }

    /// Look up a task, checking the active table first (the common case for
    /// a task still in flight) then the dead-letter table.
    #[instrument(skip(self))]
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        if let Some(task) = self.storage.get_active(id).await? {
            return Ok(Some(task));
        }
        self.storage.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn get_task_in_context(&self, context_id: &str, id: &str) -> Result<Option<Task>> {
        if let Some(task) = self.storage.get_active(id).await? {
            if task.context_id == context_id {
                return Ok(Some(task));
            }
            return Ok(None);
        }
        self.storage.get_by_context_and_id(context_id, id).await
    }

    /// Transition a task to `new_state`, optionally attaching a status
    /// message. Terminal states move the task from active into the
    /// dead-letter store; non-terminal states update it in place.
    #[instrument(skip(self, message), fields(task_id = %id, %new_state))]
    pub async fn update_task(
        &self,
        id: &str,
        new_state: TaskState,
        message: Option<Message>,
    ) -> Result<Task> {
        let mut task = self
            .storage
            .get_active(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("active task {id} not found")))?;

        a2a_core::types::validate_transition(task.status.state, new_state)?;

        task.status = TaskStatus::new(new_state);
        task.status.message = message.clone();
        if let Some(msg) = message {
            task.history.push(msg);
            self.trim_history(&mut task.history);
        }

        if new_state.is_terminal() {
            self.cancel_registry.unregister(id);
            self.storage.archive(task.clone()).await?;
        } else {
            self.storage.update_active(task.clone()).await?;
        }

        Ok(task)
    }

    /// Cancel a task from any non-terminal state. Fires the registered
    /// cancellation token (if the processor is actively running it) before
    /// transitioning storage, so the executor observes cancellation promptly
    /// instead of racing the state write.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn cancel_task(&self, id: &str) -> Result<Task> {
        // Look up active first, then dead-letter, so a terminal (already
        // archived) task is still found and reported with the exact
        // "current state is <state>" message rather than `NotFound`.
        let task = self
            .get_task(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("task {id} not found")))?;

        if !task.status.state.is_cancelable() {
            return Err(A2aError::Validation(format!(
                "cannot be canceled: current state is {}",
                task.status.state
            )));
        }

        self.cancel_registry.cancel(id);
        self.update_task(id, TaskState::Canceled, None).await
    }

    /// Move a task to `input_required`, attaching the prompt for the caller
    /// as the status message.
    #[instrument(skip(self, prompt), fields(task_id = %id))]
    pub async fn pause_task_for_input(&self, id: &str, prompt: Message) -> Result<Task> {
        self.update_task(id, TaskState::InputRequired, Some(prompt)).await
    }

    /// Resume a paused task with the caller's reply, appending it to history
    /// and moving back to `working`.
    #[instrument(skip(self, reply), fields(task_id = %id))]
    pub async fn resume_task_with_input(&self, id: &str, reply: Message) -> Result<Task> {
        let mut task = self
            .storage
            .get_active(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("active task {id} not found")))?;

        if task.status.state != TaskState::InputRequired {
            return Err(A2aError::Validation(format!(
                "task {id} is not awaiting input (state: {})",
                task.status.state
            )));
        }

        task.history.push(reply);
        self.trim_history(&mut task.history);
        task.status = TaskStatus::new(TaskState::Working);
        self.storage.update_active(task.clone()).await?;
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn is_task_paused(&self, id: &str) -> Result<bool> {
        Ok(self
            .storage
            .get_active(id)
            .await?
            .map(|t| t.status.state == TaskState::InputRequired)
            .unwrap_or(false))
    }

    /// Register a fresh cancellation token for a task the processor is
    /// about to start running.
    pub fn register_cancel(&self, task_id: &str) -> tokio_util::sync::CancellationToken {
        self.cancel_registry.register(task_id)
    }

    pub fn unregister_cancel(&self, task_id: &str) {
        self.cancel_registry.unregister(task_id);
    }

    #[instrument(skip(self))]
    pub async fn poll_task_status(&self, id: &str) -> Result<Option<TaskStatus>> {
        if let Some(task) = self.get_task(id).await? {
            return Ok(Some(task.status));
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    pub async fn get_conversation_history(&self, id: &str) -> Result<Vec<Message>> {
        Ok(self
            .get_task(id)
            .await?
            .map(|t| t.history)
            .unwrap_or_default())
    }

    /// Replace a task's history, trimmed to `max_conversation_history`
    /// (oldest dropped first).
    #[instrument(skip(self, history), fields(task_id = %id))]
    pub async fn update_conversation_history(
        &self,
        id: &str,
        mut history: Vec<Message>,
    ) -> Result<()> {
        let mut task = self
            .storage
            .get_active(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("active task {id} not found")))?;

        self.trim_history(&mut history);
        task.history = history;
        self.storage.update_active(task).await
    }

    /// Append intermediate messages (assistant tool-calls, tool results) to
    /// an active task's history without touching its state. Used by the
    /// processor to record a run's middle turns before the final
    /// [`Self::update_task`] call appends the terminal message and archives.
    #[instrument(skip(self, messages), fields(task_id = %id, added = messages.len()))]
    pub async fn append_messages(&self, id: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut task = self
            .storage
            .get_active(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("active task {id} not found")))?;

        task.history.extend(messages);
        self.trim_history(&mut task.history);
        self.storage.update_active(task).await
    }

    /// Public hook for callers (the `message/stream` handler) that assemble
    /// a task's initial history themselves instead of going through
    /// [`Self::create_task`]/[`Self::create_task_with_history`].
    pub fn trim_to_history_cap(&self, history: &mut Vec<Message>) {
        self.trim_history(history);
    }

    fn trim_history(&self, history: &mut Vec<Message>) {
        if history.len() > self.max_conversation_history {
            let excess = history.len() - self.max_conversation_history;
            history.drain(0..excess);
        }
    }

    #[instrument(skip(self))]
    pub async fn cleanup_completed_tasks(&self) -> Result<usize> {
        let removed = self.storage.cleanup_completed().await?;
        if removed > 0 {
            debug!(removed, "cleaned up completed tasks");
        }
        Ok(removed)
    }

    pub async fn list_tasks(&self, filter: ListFilter) -> Result<Vec<Task>> {
        self.storage.list(filter).await
    }

    pub async fn list_tasks_in_context(
        &self,
        context_id: &str,
        filter: ListFilter,
    ) -> Result<Vec<Task>> {
        self.storage.list_by_context(context_id, filter).await
    }

    pub async fn queue_length(&self) -> Result<usize> {
        self.storage.queue_length().await
    }

    pub fn set_push_notification_config(&self, task_id: &str, config: PushNotificationConfig) {
        self.push_configs.entry(task_id.to_string()).or_default().push(config);
    }

    pub fn get_push_notification_configs(&self, task_id: &str) -> Vec<PushNotificationConfig> {
        self.push_configs
            .get(task_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn delete_push_notification_config(&self, task_id: &str, config_id: &str) {
        if let Some(mut configs) = self.push_configs.get_mut(task_id) {
            configs.retain(|c| c.id != config_id);
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_storage::in_memory::InMemoryStorage;

    fn manager() -> TaskManager {
        TaskManager::new(Arc::new(InMemoryStorage::new()), 50)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();

        // create_task only enqueues; the active record exists once a
        // consumer (the processor) would have dequeued it, but the manager
        // writes it eagerly so get_task sees it immediately too.
        let fetched = mgr.get_task(&task.id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn update_task_to_terminal_state_archives_it() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&task.id, TaskState::Working, None).await.unwrap();
        mgr.update_task(&task.id, TaskState::Completed, None).await.unwrap();

        assert!(mgr.storage().get_active(&task.id).await.unwrap().is_none());
        let archived = mgr.storage().get(&task.id).await.unwrap().unwrap();
        assert_eq!(archived.status.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn cancel_fires_registered_token() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&task.id, TaskState::Working, None).await.unwrap();
        let token = mgr.register_cancel(&task.id);

        mgr.cancel_task(&task.id).await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_on_terminal_state_reports_current_state_in_message() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&task.id, TaskState::Working, None).await.unwrap();
        mgr.update_task(&task.id, TaskState::Completed, None).await.unwrap();

        let err = mgr.cancel_task(&task.id).await.unwrap_err();
        assert!(err.to_string().contains("current state is completed"));
    }

    #[tokio::test]
    async fn resume_requires_input_required_state() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&task.id, TaskState::Working, None).await.unwrap();

        let result = mgr.resume_task_with_input(&task.id, Message::user_text("reply")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reject_for_queue_full_archives_a_failed_task_without_queuing() {
        let mgr = manager();
        let task = mgr
            .reject_for_queue_full("ctx-1", Message::user_text("hi"))
            .await
            .unwrap();

        assert_eq!(task.status.state, TaskState::Failed);
        assert!(task.status.message.as_ref().unwrap().text_content().contains("queue is full"));
        assert_eq!(mgr.queue_length().await.unwrap(), 0);
        assert!(mgr.storage().get(&task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn append_messages_extends_active_history() {
        let mgr = manager();
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&task.id, TaskState::Working, None).await.unwrap();

        mgr.append_messages(
            &task.id,
            vec![Message::assistant_text("thinking"), Message::user_text("tool result")],
        )
        .await
        .unwrap();

        let history = mgr.get_conversation_history(&task.id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].text_content(), "thinking");
    }

    #[tokio::test]
    async fn create_task_seeds_prior_context_history() {
        let mgr = manager();
        let first = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        mgr.update_task(&first.id, TaskState::Working, None).await.unwrap();
        mgr.update_task(
            &first.id,
            TaskState::Completed,
            Some(Message::assistant_text("hello")),
        )
        .await
        .unwrap();

        let second = mgr
            .create_task("ctx-1", Message::user_text("again"), "req-2".into())
            .await
            .unwrap();

        assert_eq!(second.history.len(), 3);
        assert_eq!(second.history[0].text_content(), "hi");
        assert_eq!(second.history[1].text_content(), "hello");
        assert_eq!(second.history[2].text_content(), "again");
    }

    #[tokio::test]
    async fn zero_max_history_means_new_tasks_start_empty_before_the_triggering_message() {
        let mgr = TaskManager::new(Arc::new(InMemoryStorage::new()), 0);
        let first = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        assert!(first.history.is_empty());
    }

    #[tokio::test]
    async fn history_trims_to_max_length() {
        let mgr = TaskManager::new(Arc::new(InMemoryStorage::new()), 2);
        let task = mgr
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();
        let history = vec![
            Message::user_text("one"),
            Message::user_text("two"),
            Message::user_text("three"),
        ];
        mgr.update_conversation_history(&task.id, history).await.unwrap();
        let trimmed = mgr.get_conversation_history(&task.id).await.unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].text_content(), "two");
    }
}
