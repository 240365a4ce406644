//! In-memory backend — maps guarded by a reader/writer lock; the queue is a
//! `VecDeque` plus a buffered notification channel used to wake blocked
//! consumers. This backend is mandatory and is the default for tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use a2a_core::error::{A2aError, Result};
use a2a_core::types::{ListFilter, QueuedTask, StorageStats, Task, TaskState};

use crate::{matches_filter, paginate, Storage};

/// Notification channel capacity — generous so a burst of enqueues never
/// blocks a producer; a full channel is never an error, it just means a
/// wake-up is already pending.
const NOTIFY_CAPACITY: usize = 1000;

struct Inner {
    active: HashMap<String, Task>,
    dead: HashMap<String, Task>,
    /// context_id -> set of archived task ids.
    ctx_index: HashMap<String, HashSet<String>>,
    queue: VecDeque<QueuedTask>,
}

pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    notify_tx: mpsc::Sender<()>,
    notify_rx: Mutex<mpsc::Receiver<()>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                active: HashMap::new(),
                dead: HashMap::new(),
                ctx_index: HashMap::new(),
                queue: VecDeque::new(),
            }),
            notify_tx,
            notify_rx: Mutex::new(notify_rx),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn enqueue(&self, task: Task, request_id: String) -> Result<()> {
        let id = task.id.clone();
        {
            let mut inner = self.inner.write().await;
            inner.active.insert(id, task.clone());
            inner.queue.push_back(QueuedTask { task, request_id });
        }
        // A full channel is never an error — it's an idempotent wake signal;
        // there's already a pending notification for a waiting consumer.
        let _ = self.notify_tx.try_send(());
        Ok(())
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<QueuedTask> {
        loop {
            {
                let mut inner = self.inner.write().await;
                if let Some(qt) = inner.queue.pop_front() {
                    return Ok(qt);
                }
            }

            let mut rx = self.notify_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return Err(A2aError::Canceled),
                _ = rx.recv() => {}
            }
        }
    }

    async fn queue_length(&self) -> Result<usize> {
        Ok(self.inner.read().await.queue.len())
    }

    async fn clear_queue(&self) -> Result<()> {
        self.inner.write().await.queue.clear();
        Ok(())
    }

    async fn get_active(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.inner.read().await.active.get(id).cloned())
    }

    async fn create_active(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.active.contains_key(&task.id) {
            return Err(A2aError::Conflict(format!(
                "active task {} already exists",
                task.id
            )));
        }
        inner.active.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_active(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.active.contains_key(&task.id) {
            return Err(A2aError::NotFound(format!("active task {} not found", task.id)));
        }
        inner.active.insert(task.id.clone(), task);
        Ok(())
    }

    async fn archive(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.active.remove(&task.id);
        inner
            .ctx_index
            .entry(task.context_id.clone())
            .or_default()
            .insert(task.id.clone());
        inner.dead.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.inner.read().await.dead.get(id).cloned())
    }

    async fn get_by_context_and_id(&self, context_id: &str, id: &str) -> Result<Option<Task>> {
        let inner = self.inner.read().await;
        Ok(inner
            .dead
            .get(id)
            .filter(|t| t.context_id == context_id)
            .cloned())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Task>> {
        let inner = self.inner.read().await;
        let matched: Vec<Task> = inner
            .dead
            .values()
            .filter(|t| matches_filter(t, &filter))
            .cloned()
            .collect();
        Ok(paginate(matched, &filter))
    }

    async fn list_by_context(&self, context_id: &str, filter: ListFilter) -> Result<Vec<Task>> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.ctx_index.get(context_id) else {
            return Ok(Vec::new());
        };
        let matched: Vec<Task> = ids
            .iter()
            .filter_map(|id| inner.dead.get(id))
            .filter(|t| matches_filter(t, &filter))
            .cloned()
            .collect();
        Ok(paginate(matched, &filter))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.dead.remove(id) else {
            return Err(A2aError::NotFound(format!("task {id} not found")));
        };
        if let Some(set) = inner.ctx_index.get_mut(&task.context_id) {
            set.remove(id);
        }
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.ctx_index.keys().cloned().collect())
    }

    async fn delete_context_and_tasks(&self, context_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(ids) = inner.ctx_index.remove(context_id) {
            for id in ids {
                inner.dead.remove(&id);
            }
        }
        Ok(())
    }

    async fn cleanup_completed(&self) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let to_remove: Vec<String> = inner
            .dead
            .values()
            .filter(|t| t.status.state.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        for id in &to_remove {
            if let Some(task) = inner.dead.remove(id) {
                if let Some(set) = inner.ctx_index.get_mut(&task.context_id) {
                    set.remove(id);
                }
            }
        }
        Ok(to_remove.len())
    }

    async fn cleanup_with_retention(
        &self,
        max_completed: usize,
        max_failed: usize,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;

        let retain = |tasks: &HashMap<String, Task>, state: TaskState, keep: usize| -> HashSet<String> {
            let mut matching: Vec<&Task> = tasks
                .values()
                .filter(|t| t.status.state == state)
                .collect();
            matching.sort_by(|a, b| {
                b.status
                    .timestamp
                    .clone()
                    .unwrap_or_default()
                    .cmp(&a.status.timestamp.clone().unwrap_or_default())
            });
            matching
                .into_iter()
                .take(keep)
                .map(|t| t.id.clone())
                .collect()
        };

        let keep_completed = retain(&inner.dead, TaskState::Completed, max_completed);
        let keep_failed = retain(&inner.dead, TaskState::Failed, max_failed);
        // Canceled/rejected share the completed retention bucket — there is
        // no dedicated knob for them in the interface.
        let keep_canceled = retain(&inner.dead, TaskState::Canceled, max_completed);
        let keep_rejected = retain(&inner.dead, TaskState::Rejected, max_completed);

        let to_remove: Vec<String> = inner
            .dead
            .values()
            .filter(|t| t.status.state.is_terminal())
            .filter(|t| {
                !keep_completed.contains(&t.id)
                    && !keep_failed.contains(&t.id)
                    && !keep_canceled.contains(&t.id)
                    && !keep_rejected.contains(&t.id)
            })
            .map(|t| t.id.clone())
            .collect();

        for id in &to_remove {
            if let Some(task) = inner.dead.remove(id) {
                if let Some(set) = inner.ctx_index.get_mut(&task.context_id) {
                    set.remove(id);
                }
            }
        }

        Ok(to_remove.len())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let inner = self.inner.read().await;
        let mut by_state: HashMap<TaskState, usize> = HashMap::new();
        let mut total_messages = 0usize;

        let all = inner.active.values().chain(inner.dead.values());
        let mut total = 0usize;
        for task in all {
            total += 1;
            *by_state.entry(task.status.state).or_insert(0) += 1;
            total_messages += task.history.len();
        }

        let contexts = inner.ctx_index.len().max(
            inner
                .active
                .values()
                .map(|t| t.context_id.clone())
                .collect::<HashSet<_>>()
                .len(),
        );

        let avg_tasks_per_context = if contexts > 0 {
            total as f64 / contexts as f64
        } else {
            0.0
        };
        let avg_messages_per_context = if contexts > 0 {
            total_messages as f64 / contexts as f64
        } else {
            0.0
        };

        Ok(StorageStats {
            total,
            by_state,
            contexts,
            avg_tasks_per_context,
            total_messages,
            avg_messages_per_context,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
