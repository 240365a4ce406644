use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{ArtifactSink, InvocationContext, Tool, ToolResult, CREATE_ARTIFACT_TOOL_NAME};

const DEFAULT_ARTIFACT_TYPE: &str = "url";

/// Optional tool, enabled via `ToolboxConfig::enable_create_artifact`, that
/// lets the model persist an artifact against the current task. `content`
/// is required; `type` defaults to `"url"` (content is a reference) and
/// `name`/`filename` are optional labels.
pub struct CreateArtifactTool {
    sink: Arc<dyn ArtifactSink>,
}

impl CreateArtifactTool {
    pub fn new(sink: Arc<dyn ArtifactSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for CreateArtifactTool {
    fn name(&self) -> &str {
        CREATE_ARTIFACT_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Create an artifact (a URL reference or literal content) and attach it to this task."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string"},
                "type": {"type": "string", "default": DEFAULT_ARTIFACT_TYPE},
                "name": {"type": "string"},
                "filename": {"type": "string"}
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &InvocationContext) -> ToolResult {
        let Some(content) = input.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::error("create_artifact requires content");
        };
        let artifact_type = input
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_ARTIFACT_TYPE);
        let name = input.get("name").and_then(|v| v.as_str());
        let filename = input.get("filename").and_then(|v| v.as_str());

        match self
            .sink
            .create_artifact(&ctx.task_id, &ctx.context_id, content, artifact_type, name, filename)
            .await
        {
            Ok(artifact) => ToolResult::success(format!("created artifact {}", artifact.artifact_id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
