use anyhow::bail;
use serde_json::{json, Value};

use relay_core::spawn::SpawnRequest;
use relay_core::steps::{AgentStep, Resume};
use relay_core::tools::ToolResult;

use crate::scheduler::AgentProgram;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    AwaitingList,
    Reported,
}

/// Local file-lister sub-agent: one `list_files` call, reported as text.
pub struct FileLister {
    prompt: String,
    directories: Value,
    phase: Phase,
}

impl FileLister {
    pub fn new(prompt: impl Into<String>, params: &Value) -> Self {
        Self {
            prompt: prompt.into(),
            directories: params.get("directories").cloned().unwrap_or(Value::Null),
            phase: Phase::Start,
        }
    }

    pub fn from_request(request: &SpawnRequest) -> Self {
        Self::new(request.prompt.clone(), &request.params)
    }
}

impl AgentProgram for FileLister {
    fn resume(&mut self, input: Resume) -> anyhow::Result<AgentStep> {
        match (self.phase, input) {
            (Phase::Start, Resume::Start) => {
                self.phase = Phase::AwaitingList;
                let mut args = json!({ "query": self.prompt });
                if self.directories.is_array() {
                    args["directories"] = self.directories.clone();
                }
                Ok(AgentStep::tool_call("list_files", args))
            }
            (Phase::AwaitingList, Resume::ToolResult(result)) => {
                self.phase = Phase::Reported;
                match result {
                    ToolResult::Text { text } => Ok(AgentStep::text(text)),
                    ToolResult::Json { value } => Ok(AgentStep::text(value.to_string())),
                    ToolResult::Error { message } => bail!("list_files failed: {message}"),
                }
            }
            (Phase::Reported, _) => Ok(AgentStep::TurnEnd),
            (phase, input) => bail!("file lister resumed with {input:?} while in {phase:?}"),
        }
    }
}
