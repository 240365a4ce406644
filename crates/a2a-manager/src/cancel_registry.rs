//! Task id -> cancellation signal indirection.
//!
//! Kept separate from [`a2a_storage::Storage`] so storage can be remote or
//! stateless while cancellation is always a local, in-process capability:
//! a `CancellationToken` cannot be serialized across a Redis connection, and
//! it doesn't need to be — whichever process is actually running the task
//! holds the token. The processor registers a token when it starts working a
//! task and unregisters it when the task leaves a cancelable state.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<String, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `task_id`, replacing any prior one.
    pub fn register(&self, task_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(task_id.to_string(), token.clone());
        token
    }

    /// Fire the token for `task_id`, if one is registered. Returns whether a
    /// token was found.
    pub fn cancel(&self, task_id: &str) -> bool {
        if let Some(token) = self.tokens.get(task_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn unregister(&self, task_id: &str) {
        self.tokens.remove(task_id);
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.tokens.contains_key(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_fires_the_registered_token() {
        let registry = CancelRegistry::new();
        let token = registry.register("task-1");
        assert!(registry.cancel("task-1"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_on_unknown_task_is_a_no_op() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel("ghost"));
    }

    #[test]
    fn unregister_removes_the_token() {
        let registry = CancelRegistry::new();
        registry.register("task-1");
        registry.unregister("task-1");
        assert!(!registry.is_registered("task-1"));
        assert!(!registry.cancel("task-1"));
    }
}
