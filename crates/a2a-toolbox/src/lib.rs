//! The tool box: a registry of named, JSON-schema-described tools the agent
//! loop can call. `input_required` is always present — it is
//! the escape hatch an agent uses to pause a task and ask the caller for
//! more information. `create_artifact` is enabled per [`ToolboxConfig`].

pub mod artifact_sink;
pub mod create_artifact;
pub mod input_required;
pub mod registry;

pub use artifact_sink::ArtifactSink;
pub use create_artifact::CreateArtifactTool;
pub use input_required::InputRequiredTool;
pub use registry::ToolBox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a tool needs to know about the task it's running inside,
/// without reaching into storage directly.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub task_id: String,
    pub context_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// A named, schema-described capability the agent loop can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value, ctx: &InvocationContext) -> ToolResult;
}

/// Name every agent-loop executor recognizes as the input-required
/// escape hatch, regardless of what tool implementation is registered
/// under it.
pub const INPUT_REQUIRED_TOOL_NAME: &str = "input_required";
pub const CREATE_ARTIFACT_TOOL_NAME: &str = "create_artifact";
