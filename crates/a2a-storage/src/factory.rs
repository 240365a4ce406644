//! Storage backend registry — resolves a [`QueueConfig`] into a concrete
//! `Arc<dyn Storage>`, the same shape as the provider lookup tables used
//! elsewhere in this codebase.

use std::sync::Arc;

use a2a_core::config::{QueueConfig, QueueProvider};
use a2a_core::error::{A2aError, Result};

use crate::in_memory::InMemoryStorage;
use crate::Storage;

/// Build the storage backend named by `cfg.provider`.
///
/// `memory` never fails. `redis` requires `cfg.url` and the `redis-backend`
/// feature; its absence is a config error, not a panic.
pub async fn build_storage(cfg: &QueueConfig) -> Result<Arc<dyn Storage>> {
    match cfg.provider {
        QueueProvider::Memory => Ok(Arc::new(InMemoryStorage::new())),
        QueueProvider::Redis => build_redis(cfg).await,
    }
}

#[cfg(feature = "redis-backend")]
async fn build_redis(cfg: &QueueConfig) -> Result<Arc<dyn Storage>> {
    let url = cfg
        .url
        .as_deref()
        .ok_or_else(|| A2aError::Config("queue.url is required when provider = \"redis\"".into()))?;
    let storage = crate::remote_kv::RedisStorage::connect(url, cfg.namespace.clone()).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "redis-backend"))]
async fn build_redis(_cfg: &QueueConfig) -> Result<Arc<dyn Storage>> {
    Err(A2aError::Config(
        "redis queue provider requested but this binary was built without the redis-backend feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_provider_always_builds() {
        let cfg = QueueConfig {
            provider: QueueProvider::Memory,
            ..Default::default()
        };
        let storage = build_storage(&cfg).await.unwrap();
        assert_eq!(storage.queue_length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn redis_provider_without_url_is_a_config_error() {
        let cfg = QueueConfig {
            provider: QueueProvider::Redis,
            url: None,
            ..Default::default()
        };
        let result = build_storage(&cfg).await;
        assert!(matches!(result, Err(A2aError::Config(_))));
    }
}
