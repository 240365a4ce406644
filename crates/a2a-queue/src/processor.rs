//! The single-consumer work queue processor: dequeues tasks,
//! drives them through the agent execution loop, and records the outcome.
//! Runs a blocking dequeue loop alongside a periodic cleanup ticker, both
//! torn down by one shared `CancellationToken` also threaded through
//! storage and the cancel registry.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use a2a_agent::AgentLoop;
use a2a_core::error::A2aError;
use a2a_core::types::TaskState;
use a2a_manager::TaskManager;
use a2a_storage::Storage;
use a2a_toolbox::InvocationContext;

/// Runs the processor loop plus a parallel cleanup ticker until `shutdown`
/// fires.
pub struct Processor {
    storage: Arc<dyn Storage>,
    manager: Arc<TaskManager>,
    agent: Arc<AgentLoop>,
    cleanup_interval: Duration,
}

impl Processor {
    pub fn new(
        storage: Arc<dyn Storage>,
        manager: Arc<TaskManager>,
        agent: Arc<AgentLoop>,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            storage,
            manager,
            agent,
            cleanup_interval,
        }
    }

    /// Drive both the dequeue loop and the cleanup ticker to completion.
    /// Returns once `shutdown` fires and both have wound down.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let cleanup_handle = tokio::spawn({
            let processor = self.clone();
            let shutdown = shutdown.clone();
            async move { processor.run_cleanup_ticker(shutdown).await }
        });

        self.run_dequeue_loop(shutdown).await;
        let _ = cleanup_handle.await;
    }

    #[instrument(skip(self, shutdown))]
    async fn run_dequeue_loop(&self, shutdown: CancellationToken) {
        info!("processor started");
        loop {
            let queued = match self.storage.dequeue(&shutdown).await {
                Ok(qt) => qt,
                Err(A2aError::Canceled) => {
                    info!("processor shutting down: dequeue canceled");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "dequeue failed");
                    break;
                }
            };

            self.process_one(queued.task.id, queued.task.status.message)
                .await;
        }
    }

    /// Run one task to completion: register its cancel token, transition to
    /// `working`, drive the agent loop, then transition to the resulting
    /// terminal (or paused) state. Always unregisters the cancel token,
    /// whatever the outcome.
    #[instrument(skip(self, status_message), fields(task_id = %task_id))]
    async fn process_one(&self, task_id: String, status_message: Option<a2a_core::types::Message>) {
        let local_cancel = self.manager.register_cancel(&task_id);

        let outcome = self.run_task(&task_id, status_message, &local_cancel).await;

        if let Err(e) = &outcome {
            warn!(error = %e, "task run failed");
        }

        self.manager.unregister_cancel(&task_id);
    }

    async fn run_task(
        &self,
        task_id: &str,
        status_message: Option<a2a_core::types::Message>,
        cancel: &CancellationToken,
    ) -> Result<(), A2aError> {
        let task = self
            .manager
            .update_task(task_id, TaskState::Working, status_message)
            .await?;

        let ctx = InvocationContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
        };

        match self.agent.run(task.history.clone(), &ctx, cancel).await {
            Ok(outcome) => {
                self.manager
                    .append_messages(task_id, outcome.additional_messages)
                    .await?;

                let final_state = if outcome.response_message.kind == a2a_core::types::MessageKind::InputRequired {
                    TaskState::InputRequired
                } else {
                    TaskState::Completed
                };

                self.manager
                    .update_task(task_id, final_state, Some(outcome.response_message))
                    .await?;
                Ok(())
            }
            Err(e) => {
                let error_message = a2a_core::types::Message::assistant_text(e.to_string());
                self.manager
                    .update_task(task_id, TaskState::Failed, Some(error_message))
                    .await?;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, shutdown))]
    async fn run_cleanup_ticker(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.cleanup_interval);
        interval.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.manager.cleanup_completed_tasks().await {
                        error!(error = %e, "cleanup tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("cleanup ticker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_storage::in_memory::InMemoryStorage;
    use a2a_toolbox::ToolBox;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    use a2a_agent::client::{
        ChatChoice, ChatCompletionRequest, ChatCompletionResponse, LlmClient, ProviderError,
    };
    use a2a_agent::client::{BackendMessage, BackendRole};
    use a2a_core::types::Message;

    struct ScriptedClient {
        responses: TokioMutex<Vec<ChatCompletionResponse>>,
        calls: AtomicUsize,
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
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    #[tokio::test]
    async fn processes_one_task_to_completion_and_stops_on_shutdown() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = Arc::new(TaskManager::new(storage.clone(), 50));
        let client = Arc::new(ScriptedClient {
            responses: TokioMutex::new(vec![final_response("done")]),
            calls: AtomicUsize::new(0),
        });
        let agent = Arc::new(AgentLoop::new(client, Arc::new(ToolBox::new()), "gpt-4o"));
        let processor = Arc::new(Processor::new(
            storage.clone(),
            manager.clone(),
            agent,
            Duration::from_secs(3600),
        ));

        let task = manager
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let manager_poll = manager.clone();
        let task_id = task.id.clone();

        let run_handle = tokio::spawn(processor.run(shutdown.clone()));

        // Poll until the task reaches a terminal state, then shut down.
        for _ in 0..100 {
            if let Some(found) = manager_poll.get_task(&task_id).await.unwrap() {
                if found.status.state.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_clone.cancel();
        run_handle.await.unwrap();

        let archived = manager.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(archived.status.state, TaskState::Completed);
        assert_eq!(archived.status.message.unwrap().text_content(), "done");
    }

    #[tokio::test]
    async fn agent_error_transitions_task_to_failed() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = Arc::new(TaskManager::new(storage.clone(), 50));
        let client = Arc::new(ScriptedClient {
            responses: TokioMutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let agent = Arc::new(AgentLoop::new(client, Arc::new(ToolBox::new()), "gpt-4o"));
        let processor = Arc::new(Processor::new(
            storage.clone(),
            manager.clone(),
            agent,
            Duration::from_secs(3600),
        ));

        let task = manager
            .create_task("ctx-1", Message::user_text("hi"), "req-1".into())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let manager_poll = manager.clone();
        let task_id = task.id.clone();

        let run_handle = tokio::spawn(processor.run(shutdown.clone()));

        for _ in 0..100 {
            if let Some(found) = manager_poll.get_task(&task_id).await.unwrap() {
                if found.status.state.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_clone.cancel();
        run_handle.await.unwrap();

        let archived = manager.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(archived.status.state, TaskState::Failed);
    }
}
