use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use relay_core::tools::{ToolError, ToolResult};

use crate::context::{Tool, ToolContext};
use crate::diff::{create_patch, strip_patch_header, DEFAULT_CONTEXT_LINES};

/// Proposes new content for a file without touching the disk.
///
/// The diff is computed against the run's previous proposal for the same
/// path, or the on-disk file when there is none, so consecutive proposals
/// produce incremental diffs.
pub struct ProposeWriteFileTool;

/// Strip exactly one leading newline.
pub fn normalize_content(content: &str) -> &str {
    content.strip_prefix('\n').unwrap_or(content)
}

#[async_trait]
impl Tool for ProposeWriteFileTool {
    fn name(&self) -> &str {
        "propose_write_file"
    }

    fn description(&self) -> &str {
        "Propose the full new content of a file and get back the diff against the current proposal or disk"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file, relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "Complete proposed file content"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let path = input["path"]
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;
        let content = input["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let run = &ctx.run;
        let (baseline, is_new_file) = match run.proposed.get(&run.run_id, path) {
            Some(previous) => (previous, false),
            None => match run.files.read_optional(path).await? {
                Some(on_disk) => (on_disk, false),
                None => (String::new(), true),
            },
        };

        let content = normalize_content(content);
        let patch = create_patch(path, &baseline, content, DEFAULT_CONTEXT_LINES);
        let unified_diff = strip_patch_header(&patch);
        run.proposed.set(&run.run_id, path, content.to_string());

        debug!(path, is_new_file, diff_len = unified_diff.len(), "proposal committed");

        let message = if is_new_file {
            format!("Proposed new file {path}")
        } else {
            format!("Proposed changes to {path}")
        };
        Ok(ToolResult::json(json!({
            "file": path,
            "message": message,
            "unifiedDiff": unified_diff,
            "isNewFile": is_new_file,
        })))
    }
}
