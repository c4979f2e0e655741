use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// How the dispatcher orders a tool against earlier calls of the same turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Handler may start before earlier calls finish; it awaits its
    /// ordering token itself before committing anything observable.
    Concurrent,
    /// Handler starts only after the previous call finished.
    Sequential,
}

/// A request to invoke a named tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: ToolCallId,
    pub tool_name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            id: ToolCallId::new(),
            tool_name: tool_name.into(),
            input,
        }
    }
}

/// Outcome of a tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    Json { value: Value },
    Text { text: String },
    Error { message: String },
}

impl ToolResult {
    pub fn json(value: Value) -> Self {
        Self::Json { value }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Short human-readable preview, used in events and logs.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            Self::Json { value } => value.to_string(),
            Self::Text { text } => text.clone(),
            Self::Error { message } => format!("[error] {message}"),
        };
        full.chars().take(max_chars).collect()
    }
}

/// Tool definition advertised to agent logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub execution_mode: ExecutionMode,
    pub parameters_schema: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Tool call cancelled")]
    Cancelled,
}

/// Reads files on behalf of tool handlers.
///
/// `Ok(None)` means the file does not exist; any other failure is an error.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read_optional(&self, path: &str) -> Result<Option<String>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_mode_serde() {
        let json = serde_json::to_string(&ExecutionMode::Concurrent).unwrap();
        assert_eq!(json, r#""concurrent""#);
        let json = serde_json::to_string(&ExecutionMode::Sequential).unwrap();
        assert_eq!(json, r#""sequential""#);
    }

    #[test]
    fn tool_result_is_tagged() {
        let json = serde_json::to_value(ToolResult::json(json!({"file": "a.rs"}))).unwrap();
        assert_eq!(json, json!({"type": "json", "value": {"file": "a.rs"}}));
        let json = serde_json::to_value(ToolResult::error("boom")).unwrap();
        assert_eq!(json, json!({"type": "error", "message": "boom"}));
    }

    #[test]
    fn tool_result_preview() {
        assert_eq!(ToolResult::text("abcdef").preview(3), "abc");
        assert_eq!(ToolResult::error("bad").preview(100), "[error] bad");
        assert!(!ToolResult::text("x").is_error());
        assert!(ToolResult::error("x").is_error());
    }

    #[test]
    fn tool_call_serializes_camel_case() {
        let call = ToolCall::new("read_files", json!({"paths": []}));
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["toolName"], "read_files");
        assert!(json["id"].as_str().unwrap().starts_with("call_"));
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("missing path".into());
        assert_eq!(err.to_string(), "invalid arguments: missing path");

        let err = ToolError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Tool timed out after 60s");
        assert_eq!(ToolError::Cancelled.to_string(), "Tool call cancelled");

        let err = ToolError::Io {
            path: "src/lib.rs".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("failed to read src/lib.rs"));
    }
}
