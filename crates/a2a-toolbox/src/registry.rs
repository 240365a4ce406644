use std::collections::HashMap;

use crate::{InvocationContext, Tool, ToolResult};
use a2a_core::types::Part;
use a2a_core::Result;

/// Registry of tools available to the agent loop for a given toolbox
/// configuration. Construction is explicit (`add`) rather than a global
/// static table — different deployments can wire up different tool sets.
#[derive(Default)]
pub struct ToolBox {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn get_all(&self) -> impl Iterator<Item = &Box<dyn Tool>> {
        self.tools.values()
    }

    /// Convert every registered tool into the wire schema expected by an
    /// LLM provider's tool-definition list.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a named tool. Returns an error `ToolResult` (not an `Err`) for
    /// an unknown tool name — a bad tool call from the model is a normal
    /// part of the loop, not a system failure.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &InvocationContext,
    ) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(input, ctx).await,
            None => ToolResult::error(format!("unknown tool: {name}")),
        }
    }

    /// Convert a tool's text output into message parts for history. Kept
    /// here rather than on `ToolResult` since only the registry knows the
    /// `Part` type used by the protocol layer.
    pub fn result_to_parts(result: &ToolResult) -> Result<Vec<Part>> {
        Ok(vec![Part::text(result.content.clone())])
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, input: serde_json::Value, _ctx: &InvocationContext) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext {
            task_id: "t-1".into(),
            context_id: "c-1".into(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_result_not_err() {
        let toolbox = ToolBox::new();
        let result = toolbox.execute("ghost", serde_json::json!({}), &ctx()).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn registered_tool_executes() {
        let mut toolbox = ToolBox::new();
        toolbox.add(Box::new(EchoTool));
        let result = toolbox
            .execute("echo", serde_json::json!({"x": 1}), &ctx())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, r#"{"x":1}"#);
    }
}
