use async_trait::async_trait;

use a2a_core::types::Artifact;
use a2a_core::Result;

/// What the optional `create_artifact` tool needs from whatever artifact
/// store the deployment wires up. Defined here (rather than depended on
/// from `a2a-artifacts`) so this crate doesn't need to know about artifact
/// storage, only about the narrow capability the tool exercises.
///
/// `artifact_type` distinguishes a `content` that's a URL reference
/// (`"url"`, the default) from one that's the literal content to persist
/// (e.g. `"text"`); `name`/`filename` are optional, free-form labels.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn create_artifact(
        &self,
        task_id: &str,
        context_id: &str,
        content: &str,
        artifact_type: &str,
        name: Option<&str>,
        filename: Option<&str>,
    ) -> Result<Artifact>;
}
