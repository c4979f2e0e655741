use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use relay_core::tools::{ExecutionMode, ToolError, ToolResult};

use crate::context::{Tool, ToolContext};

/// Records followup suggestions for the user.
pub struct SuggestFollowupsTool;

#[async_trait]
impl Tool for SuggestFollowupsTool {
    fn name(&self) -> &str {
        "suggest_followups"
    }

    fn description(&self) -> &str {
        "Suggest followup prompts the user may want to send next"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["followups"],
            "properties": {
                "followups": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            }
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let count = input["followups"].as_array().map_or(0, Vec::len);
        ctx.ordering.finished().await;
        info!(run_id = %ctx.run.run_id, count, "followups suggested");
        Ok(ToolResult::json(json!({"message": "Followups suggested!"})))
    }
}
