use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use a2a_core::error::{A2aError, Result};
use a2a_core::types::{Artifact, FileContent, Part, Task};
use a2a_toolbox::ArtifactSink;

/// External collaborator — not part of the core task/queue/agent
/// pipeline, but the optional `create_artifact` tool depends on the first
/// two operations.
#[async_trait]
pub trait ArtifactService: Send + Sync {
    async fn create_file_artifact(
        &self,
        name: &str,
        description: Option<&str>,
        filename: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Artifact>;

    async fn add_artifact_to_task(&self, task: &mut Task, artifact: Artifact);

    async fn exists(&self, artifact_id: &str) -> bool;
    async fn retrieve(&self, artifact_id: &str) -> Result<Vec<u8>>;

    /// Delete artifacts older than `max_age`. Returns the count removed.
    async fn cleanup_expired(&self, max_age: Duration) -> Result<usize>;
    /// Keep only the `max_count` most recently created artifacts.
    async fn cleanup_oldest(&self, max_count: usize) -> Result<usize>;
}

struct StoredMeta {
    filename: String,
    created_at: SystemTime,
}

/// Filesystem-backed implementation: one file per artifact under `root`,
/// named by artifact id, with an in-memory creation-time index for the
/// cleanup sweeps.
pub struct FsArtifactService {
    root: PathBuf,
    index: DashMap<String, StoredMeta>,
}

impl FsArtifactService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: DashMap::new(),
        }
    }

    fn path_for(&self, artifact_id: &str) -> PathBuf {
        self.root.join(artifact_id)
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| A2aError::Internal(format!("creating artifact root: {e}")))
    }
}

#[async_trait]
impl ArtifactService for FsArtifactService {
    #[instrument(skip(self, bytes), fields(name, filename, size = bytes.len()))]
    async fn create_file_artifact(
        &self,
        name: &str,
        description: Option<&str>,
        filename: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Artifact> {
        self.ensure_root().await?;
        let artifact_id = Uuid::new_v4().to_string();
        let path = self.path_for(&artifact_id);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| A2aError::Internal(format!("writing artifact {artifact_id}: {e}")))?;

        self.index.insert(
            artifact_id.clone(),
            StoredMeta {
                filename: filename.to_string(),
                created_at: SystemTime::now(),
            },
        );

        debug!(artifact_id = %artifact_id, "artifact written");

        Ok(Artifact {
            artifact_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            parts: vec![Part::File {
                file: FileContent {
                    name: filename.to_string(),
                    mime_type: mime_type.to_string(),
                    bytes: None,
                    uri: Some(path.display().to_string()),
                },
            }],
        })
    }

    async fn add_artifact_to_task(&self, task: &mut Task, artifact: Artifact) {
        task.artifacts.push(artifact);
    }

    async fn exists(&self, artifact_id: &str) -> bool {
        tokio::fs::metadata(self.path_for(artifact_id)).await.is_ok()
    }

    async fn retrieve(&self, artifact_id: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.path_for(artifact_id))
            .await
            .map_err(|_| A2aError::NotFound(format!("artifact {artifact_id} not found")))
    }

    #[instrument(skip(self))]
    async fn cleanup_expired(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let expired: Vec<String> = self
            .index
            .iter()
            .filter(|entry| {
                now.duration_since(entry.value().created_at)
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            if self.remove(&id).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn cleanup_oldest(&self, max_count: usize) -> Result<usize> {
        let mut entries: Vec<(String, SystemTime)> = self
            .index
            .iter()
            .map(|e| (e.key().clone(), e.value().created_at))
            .collect();
        entries.sort_by_key(|(_, created_at)| *created_at);

        let overflow = entries.len().saturating_sub(max_count);
        let mut removed = 0;
        for (id, _) in entries.into_iter().take(overflow) {
            if self.remove(&id).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl FsArtifactService {
    async fn remove(&self, artifact_id: &str) -> Result<()> {
        let path = self.path_for(artifact_id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(artifact_id, error = %e, "failed to remove artifact file");
                return Err(A2aError::Internal(e.to_string()));
            }
        }
        self.index.remove(artifact_id);
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactService {
    /// `artifact_type == "url"` (the default) means `content` is itself a
    /// reference — it's wrapped in a file part as-is, with nothing written
    /// to disk. Any other `artifact_type` treats `content` as literal bytes
    /// to persist via [`Self::create_file_artifact`].
    async fn create_artifact(
        &self,
        _task_id: &str,
        _context_id: &str,
        content: &str,
        artifact_type: &str,
        name: Option<&str>,
        filename: Option<&str>,
    ) -> Result<Artifact> {
        let label = name.or(filename).unwrap_or("artifact");

        if artifact_type == "url" {
            return Ok(Artifact {
                artifact_id: Uuid::new_v4().to_string(),
                name: label.to_string(),
                description: None,
                parts: vec![Part::File {
                    file: FileContent {
                        name: filename.unwrap_or(label).to_string(),
                        mime_type: "text/uri-list".to_string(),
                        bytes: None,
                        uri: Some(content.to_string()),
                    },
                }],
            });
        }

        self.create_file_artifact(
            label,
            None,
            filename.unwrap_or(label),
            content.as_bytes(),
            "text/plain",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_retrieve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsArtifactService::new(dir.path());

        let artifact = service
            .create_file_artifact("report", None, "report.txt", b"hello", "text/plain")
            .await
            .unwrap();

        assert!(service.exists(&artifact.artifact_id).await);
        let bytes = service.retrieve(&artifact.artifact_id).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn cleanup_oldest_keeps_only_the_newest_n() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsArtifactService::new(dir.path());

        for i in 0..5 {
            service
                .create_file_artifact(&format!("a{i}"), None, "f.txt", b"x", "text/plain")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let removed = service.cleanup_oldest(2).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(service.index.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsArtifactService::new(dir.path());
        let result = service.retrieve("ghost").await;
        assert!(matches!(result, Err(A2aError::NotFound(_))));
    }
}
