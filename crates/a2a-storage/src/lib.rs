//! Pluggable task/queue storage.
//!
//! A task id lives in at most one of {queue, active, dead-letter} at any
//! moment. The [`Storage`] trait is the contract every backend implements
//! identically; [`in_memory::InMemoryStorage`] is mandatory and always
//! available, [`remote_kv::RedisStorage`] is the optional remote backend.

pub mod factory;
pub mod in_memory;
#[cfg(feature = "redis-backend")]
pub mod remote_kv;

use async_trait::async_trait;

use a2a_core::error::Result;
use a2a_core::types::{ListFilter, QueuedTask, StorageStats, Task};

/// Storage contract implemented identically by every backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Append to the FIFO queue and write the active-task record. Fails if
    /// `task` is absent from the call (the type system mostly prevents
    /// this; kept as a contract note).
    async fn enqueue(&self, task: Task, request_id: String) -> Result<()>;

    /// Block until a task is available or `cancel` fires. Strict FIFO per
    /// enqueue order.
    async fn dequeue(&self, cancel: &tokio_util::sync::CancellationToken) -> Result<QueuedTask>;

    async fn queue_length(&self) -> Result<usize>;
    async fn clear_queue(&self) -> Result<()>;

    async fn get_active(&self, id: &str) -> Result<Option<Task>>;
    async fn create_active(&self, task: Task) -> Result<()>;
    async fn update_active(&self, task: Task) -> Result<()>;

    /// Move an active record to dead-letter; add to the context index;
    /// remove the active record. Atomic with respect to concurrent reads.
    async fn archive(&self, task: Task) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Task>>;
    async fn get_by_context_and_id(&self, context_id: &str, id: &str) -> Result<Option<Task>>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<Task>>;
    async fn list_by_context(&self, context_id: &str, filter: ListFilter) -> Result<Vec<Task>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn contexts(&self) -> Result<Vec<String>>;
    async fn delete_context_and_tasks(&self, context_id: &str) -> Result<()>;

    async fn cleanup_completed(&self) -> Result<usize>;
    async fn cleanup_with_retention(
        &self,
        max_completed: usize,
        max_failed: usize,
    ) -> Result<usize>;

    async fn stats(&self) -> Result<StorageStats>;

    /// Release backend resources (connection pools). A no-op for in-memory.
    async fn close(&self) -> Result<()>;
}

/// Apply a [`ListFilter`]'s sort + offset/limit to an already state/context
/// filtered vector. Shared by every backend so pagination behaves
/// identically regardless of where the data physically lives.
pub(crate) fn paginate(mut tasks: Vec<Task>, filter: &ListFilter) -> Vec<Task> {
    use a2a_core::types::SortField;

    if let Some(sort_by) = filter.sort_by {
        tasks.sort_by(|a, b| match sort_by {
            SortField::State => a.status.state.to_string().cmp(&b.status.state.to_string()),
            SortField::ContextId => a.context_id.cmp(&b.context_id),
            SortField::Timestamp => a
                .status
                .timestamp
                .clone()
                .unwrap_or_default()
                .cmp(&b.status.timestamp.clone().unwrap_or_default()),
            SortField::Id => a.id.cmp(&b.id),
        });
    }

    let tasks: Vec<Task> = tasks.into_iter().skip(filter.offset).collect();
    if filter.limit <= 0 {
        tasks
    } else {
        tasks.into_iter().take(filter.limit as usize).collect()
    }
}

pub(crate) fn matches_filter(task: &Task, filter: &ListFilter) -> bool {
    if let Some(state) = filter.state {
        if task.status.state != state {
            return false;
        }
    }
    if let Some(ref ctx) = filter.context_id {
        if &task.context_id != ctx {
            return false;
        }
    }
    true
}
