use async_trait::async_trait;
use serde_json::{json, Map, Value};

use relay_core::tools::{ExecutionMode, ToolError, ToolResult};

use crate::context::{Tool, ToolContext};

/// Reads several files at once. Missing files map to `null`.
pub struct ReadFilesTool;

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &str {
        "read_files"
    }

    fn description(&self) -> &str {
        "Read the contents of multiple files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["paths"],
            "properties": {
                "paths": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Paths relative to the working directory"
                }
            }
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let paths: Vec<&str> = input["paths"]
            .as_array()
            .ok_or_else(|| ToolError::InvalidArguments("paths must be an array".into()))?
            .iter()
            .filter_map(Value::as_str)
            .collect();

        let reads = paths.iter().map(|path| ctx.run.files.read_optional(path));
        let contents = futures::future::join_all(reads).await;

        let mut files = Map::new();
        for (path, content) in paths.iter().zip(contents) {
            let value = match content {
                Ok(Some(text)) => Value::String(text),
                Ok(None) => Value::Null,
                Err(e) => {
                    tracing::debug!(path, error = %e, "read failed");
                    Value::Null
                }
            };
            let _ = files.insert((*path).to_string(), value);
        }

        ctx.ordering.finished().await;
        Ok(ToolResult::json(Value::Object(files)))
    }
}
