//! Redis-backed storage — one list per queue, one string key per
//! active/archived task, one set per context. The optional remote backend;
//! `InMemoryStorage` remains mandatory and is the default.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use a2a_core::error::{A2aError, Result};
use a2a_core::types::{ListFilter, QueuedTask, StorageStats, Task, TaskState};

use crate::{matches_filter, paginate, Storage};

/// How long each `BLPOP` waits before giving the caller a chance to notice
/// `cancel` fired. Short enough that cancellation feels immediate, long
/// enough to not hammer the connection with polling round-trips.
const BLPOP_POLL_SECS: f64 = 1.0;

pub struct RedisStorage {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStorage {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }

    fn queue_key(&self) -> String {
        format!("{}:queue", self.namespace)
    }
    fn active_key(&self, id: &str) -> String {
        format!("{}:active:{}", self.namespace, id)
    }
    fn dead_key(&self, id: &str) -> String {
        format!("{}:dead:{}", self.namespace, id)
    }
    fn ctx_key(&self, context_id: &str) -> String {
        format!("{}:ctx:{}", self.namespace, context_id)
    }
    fn contexts_key(&self) -> String {
        format!("{}:contexts", self.namespace)
    }
    /// Set of task ids currently holding an `active:{id}` record. Kept
    /// alongside the active records themselves (rather than derived via
    /// `SCAN`) so `stats()` can enumerate in-flight tasks the same way
    /// `InMemoryStorage` walks its `active` map.
    fn active_ids_key(&self) -> String {
        format!("{}:active_ids", self.namespace)
    }

    async fn active_tasks(&self) -> Result<Vec<Task>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(self.active_ids_key())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.read_task(&self.active_key(&id)).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn write_task(&self, key: &str, task: &Task) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(task)?;
        conn.set::<_, _, ()>(key, payload)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn read_task(&self, key: &str) -> Result<Option<Task>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn enqueue(&self, task: Task, request_id: String) -> Result<()> {
        self.write_task(&self.active_key(&task.id), &task).await?;
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(self.active_ids_key(), task.id.clone())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        let queued = QueuedTask { task, request_id };
        let payload = serde_json::to_string(&queued)?;
        conn.rpush::<_, _, ()>(self.queue_key(), payload)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<QueuedTask> {
        loop {
            if cancel.is_cancelled() {
                return Err(A2aError::Canceled);
            }

            let mut conn = self.conn.clone();
            let popped: Option<(String, String)> = conn
                .blpop(self.queue_key(), BLPOP_POLL_SECS)
                .await
                .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;

            if let Some((_, payload)) = popped {
                return Ok(serde_json::from_str(&payload)?);
            }
            // Timed out with nothing in the list — loop back and recheck
            // cancellation before blocking again.
        }
    }

    async fn queue_length(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .llen(self.queue_key())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        Ok(len)
    }

    async fn clear_queue(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.queue_key())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn get_active(&self, id: &str) -> Result<Option<Task>> {
        self.read_task(&self.active_key(id)).await
    }

    async fn create_active(&self, task: Task) -> Result<()> {
        let key = self.active_key(&task.id);
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        if exists {
            return Err(A2aError::Conflict(format!(
                "active task {} already exists",
                task.id
            )));
        }
        self.write_task(&key, &task).await?;
        conn.sadd::<_, _, ()>(self.active_ids_key(), task.id.clone())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn update_active(&self, task: Task) -> Result<()> {
        let key = self.active_key(&task.id);
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        if !exists {
            return Err(A2aError::NotFound(format!("active task {} not found", task.id)));
        }
        self.write_task(&key, &task).await
    }

    async fn archive(&self, task: Task) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.active_key(&task.id))
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        conn.srem::<_, _, ()>(self.active_ids_key(), task.id.clone())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        conn.sadd::<_, _, ()>(self.ctx_key(&task.context_id), task.id.clone())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        conn.sadd::<_, _, ()>(self.contexts_key(), task.context_id.clone())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        self.write_task(&self.dead_key(&task.id), &task).await
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        self.read_task(&self.dead_key(id)).await
    }

    async fn get_by_context_and_id(&self, context_id: &str, id: &str) -> Result<Option<Task>> {
        Ok(self
            .read_task(&self.dead_key(id))
            .await?
            .filter(|t| t.context_id == context_id))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Task>> {
        let contexts = self.contexts().await?;
        let mut all = Vec::new();
        for ctx in contexts {
            all.extend(self.list_by_context(&ctx, ListFilter::default()).await?);
        }
        let matched: Vec<Task> = all.into_iter().filter(|t| matches_filter(t, &filter)).collect();
        Ok(paginate(matched, &filter))
    }

    async fn list_by_context(&self, context_id: &str, filter: ListFilter) -> Result<Vec<Task>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(self.ctx_key(context_id))
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.read_task(&self.dead_key(&id)).await? {
                if matches_filter(&task, &filter) {
                    tasks.push(task);
                }
            }
        }
        Ok(paginate(tasks, &filter))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let task = self
            .get(id)
            .await?
            .ok_or_else(|| A2aError::NotFound(format!("task {id} not found")))?;
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.dead_key(id))
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        conn.srem::<_, _, ()>(self.ctx_key(&task.context_id), id)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(self.contexts_key())
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn delete_context_and_tasks(&self, context_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(self.ctx_key(context_id))
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        for id in &ids {
            conn.del::<_, ()>(self.dead_key(id))
                .await
                .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        }
        conn.del::<_, ()>(self.ctx_key(context_id))
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))?;
        conn.srem::<_, _, ()>(self.contexts_key(), context_id)
            .await
            .map_err(|e| A2aError::BackendUnavailable(e.to_string()))
    }

    async fn cleanup_completed(&self) -> Result<usize> {
        let all = self.list(ListFilter::default()).await?;
        let mut removed = 0;
        for task in all.iter().filter(|t| t.status.state.is_terminal()) {
            self.delete(&task.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn cleanup_with_retention(
        &self,
        max_completed: usize,
        max_failed: usize,
    ) -> Result<usize> {
        let all = self.list(ListFilter::default()).await?;

        let keep_n = |state: TaskState, n: usize| -> Vec<String> {
            let mut matching: Vec<&Task> =
                all.iter().filter(|t| t.status.state == state).collect();
            matching.sort_by(|a, b| {
                b.status
                    .timestamp
                    .clone()
                    .unwrap_or_default()
                    .cmp(&a.status.timestamp.clone().unwrap_or_default())
            });
            matching.into_iter().take(n).map(|t| t.id.clone()).collect()
        };

        let mut keep: Vec<String> = Vec::new();
        keep.extend(keep_n(TaskState::Completed, max_completed));
        keep.extend(keep_n(TaskState::Failed, max_failed));
        keep.extend(keep_n(TaskState::Canceled, max_completed));
        keep.extend(keep_n(TaskState::Rejected, max_completed));

        let mut removed = 0;
        for task in all.iter().filter(|t| t.status.state.is_terminal()) {
            if !keep.contains(&task.id) {
                self.delete(&task.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<StorageStats> {
        // Matches `InMemoryStorage::stats()`'s `active.chain(dead)` union —
        // `list()` alone only sees archived (dead-letter) tasks, which would
        // undercount every task still `working`/`submitted`/`input_required`.
        let dead = self.list(ListFilter::default()).await?;
        let active = self.active_tasks().await?;
        let contexts = self.contexts().await?;

        let mut by_state = std::collections::HashMap::new();
        let mut total_messages = 0usize;
        let mut context_ids: std::collections::HashSet<String> =
            contexts.iter().cloned().collect();
        let all = dead.iter().chain(active.iter());
        let mut total = 0usize;
        for task in all {
            total += 1;
            *by_state.entry(task.status.state).or_insert(0) += 1;
            total_messages += task.history.len();
            context_ids.insert(task.context_id.clone());
        }

        let context_count = context_ids.len();
        let avg_tasks_per_context = if context_count > 0 {
            total as f64 / context_count as f64
        } else {
            0.0
        };
        let avg_messages_per_context = if context_count > 0 {
            total_messages as f64 / context_count as f64
        } else {
            0.0
        };

        Ok(StorageStats {
            total,
            by_state,
            contexts: context_count,
            avg_tasks_per_context,
            total_messages,
            avg_messages_per_context,
        })
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager has no explicit teardown; dropping the clone
        // held by this struct is enough once the Arc<dyn Storage> drops.
        Ok(())
    }
}
