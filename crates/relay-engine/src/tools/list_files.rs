use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use relay_core::tools::{ExecutionMode, ToolError, ToolResult};

use crate::context::{resolve_path, Tool, ToolContext};
use crate::settings::FileListerSettings;

/// Lists files under the working directory whose names match query keywords.
pub struct ListFilesTool {
    settings: FileListerSettings,
}

impl ListFilesTool {
    pub fn new(settings: FileListerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files whose names match words of a query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free text; every word of 3+ characters is matched against file names"
                },
                "directories": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Directories to search (defaults to the working directory)"
                }
            }
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let root = ctx.run.working_directory.clone();
        let keywords = keywords(input["query"].as_str().unwrap_or_default());
        let directories: Vec<PathBuf> = match input["directories"].as_array() {
            Some(dirs) if !dirs.is_empty() => dirs
                .iter()
                .filter_map(Value::as_str)
                .map(|d| resolve_path(d, &root))
                .collect(),
            _ => vec![root.clone()],
        };
        let ignored = self.settings.ignored_dirs.clone();
        let max_results = self.settings.max_results;

        let listed = tokio::task::spawn_blocking(move || {
            walk(&root, &directories, &keywords, &ignored, max_results)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("list task failed: {e}")))?;

        ctx.ordering.finished().await;
        Ok(ToolResult::text(listed.join("\n")))
    }
}

/// Lowercased words of at least three characters.
fn keywords(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn walk(
    root: &Path,
    directories: &[PathBuf],
    keywords: &[String],
    ignored: &[String],
    max_results: usize,
) -> Vec<String> {
    let mut found = Vec::new();
    for dir in directories {
        // Brackets and stars in the directory itself are literal.
        let base = glob::Pattern::escape(&dir.to_string_lossy());
        let pattern = Path::new(&base).join("**").join("*");
        let Ok(entries) = glob::glob(&pattern.to_string_lossy()) else {
            continue;
        };
        for path in entries.flatten() {
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if is_ignored(relative, ignored) || !matches_keywords(relative, keywords) {
                continue;
            }
            found.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    found.sort();
    found.dedup();
    found.truncate(max_results);
    found
}

fn is_ignored(relative: &Path, ignored: &[String]) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => ignored.iter().any(|i| name == i.as_str()),
        _ => false,
    })
}

fn matches_keywords(relative: &Path, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let name = relative
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    keywords.iter().any(|k| name.contains(k.as_str()))
}
