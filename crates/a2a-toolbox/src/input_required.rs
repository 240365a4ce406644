use async_trait::async_trait;
use serde_json::json;

use crate::{InvocationContext, Tool, ToolResult, INPUT_REQUIRED_TOOL_NAME};

/// The always-present escape hatch: the model calls this instead of a
/// normal tool when it needs more information from the caller before it can
/// continue. The agent loop intercepts this tool by name before execution
/// and pauses the task — `execute` here is never reached on
/// that path; it exists only so the tool round-trips through `ToolBox` like
/// any other registered tool (e.g. direct invocation from a test harness).
pub struct InputRequiredTool;

#[async_trait]
impl Tool for InputRequiredTool {
    fn name(&self) -> &str {
        INPUT_REQUIRED_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Pause the task and ask the user a clarifying question. \
         Call this when you cannot proceed without more information."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The question to show the user"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: serde_json::Value, _ctx: &InvocationContext) -> ToolResult {
        match input.get("message").and_then(|v| v.as_str()) {
            Some(message) => ToolResult::success(message),
            None => ToolResult::error("input_required call missing `message`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> InvocationContext {
        InvocationContext {
            task_id: "t-1".into(),
            context_id: "c-1".into(),
        }
    }

    #[tokio::test]
    async fn returns_the_message_text() {
        let tool = InputRequiredTool;
        let result = tool
            .execute(serde_json::json!({"message": "which file?"}), &ctx())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "which file?");
    }

    #[tokio::test]
    async fn missing_message_is_an_error_result() {
        let tool = InputRequiredTool;
        let result = tool.execute(serde_json::json!({}), &ctx()).await;
        assert!(result.is_error);
    }
}
