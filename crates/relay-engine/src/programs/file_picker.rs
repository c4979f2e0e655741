use anyhow::bail;
use serde_json::{json, Value};
use tracing::debug;

use relay_core::spawn::SpawnRequest;
use relay_core::steps::{AgentStep, Resume};
use relay_core::tools::ToolResult;

use crate::programs::FILE_LISTER;
use crate::reconcile::{extract_spawn_results, reconcile};
use crate::scheduler::AgentProgram;

const NO_FILE_LIST: &str = "Could not extract file list from spawned agent(s)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilePickerMode {
    /// One file-lister.
    Default,
    /// Two file-listers whose results are merged.
    Max,
}

impl FilePickerMode {
    fn lister_count(self) -> usize {
        match self {
            Self::Default => 1,
            Self::Max => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    AwaitingListers,
    AwaitingRead,
    Done,
}

/// Finds files relevant to a prompt by fanning out to file-lister
/// sub-agents, merging their path lists and reading the files.
pub struct FilePicker {
    mode: FilePickerMode,
    prompt: String,
    params: Value,
    phase: Phase,
    paths: Vec<String>,
    files: Option<Value>,
}

impl FilePicker {
    pub fn new(mode: FilePickerMode, prompt: impl Into<String>, params: Value) -> Self {
        Self {
            mode,
            prompt: prompt.into(),
            params,
            phase: Phase::Start,
            paths: Vec::new(),
            files: None,
        }
    }

    pub fn from_request(mode: FilePickerMode, request: &SpawnRequest) -> Self {
        Self::new(mode, request.prompt.clone(), request.params.clone())
    }

    /// Deduplicated paths reported by the listers, once known.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// The `read_files` output (`{path: content|null}`), once read.
    pub fn files(&self) -> Option<&Value> {
        self.files.as_ref()
    }

    fn spawn_listers(&mut self) -> AgentStep {
        let agents: Vec<SpawnRequest> = (0..self.mode.lister_count())
            .map(|_| SpawnRequest::new(FILE_LISTER, self.prompt.clone()).with_params(self.params.clone()))
            .collect();
        self.phase = Phase::AwaitingListers;
        AgentStep::tool_call("spawn_agents", json!({ "agents": agents }))
    }
}

impl AgentProgram for FilePicker {
    fn resume(&mut self, input: Resume) -> anyhow::Result<AgentStep> {
        match (self.phase, input) {
            (Phase::Start, Resume::Start) => Ok(self.spawn_listers()),
            (Phase::AwaitingListers, Resume::ToolResult(result)) => {
                let batch = reconcile(&extract_spawn_results(&result));
                self.paths = batch.paths();
                debug!(
                    paths = self.paths.len(),
                    errors = batch.errors.len(),
                    "file-listers reconciled"
                );

                if !batch.has_any_usable_result || self.paths.is_empty() {
                    self.phase = Phase::Done;
                    let diagnostic = batch.diagnostic(NO_FILE_LIST);
                    let text = if batch.errors.is_empty() {
                        format!("Error: {diagnostic}")
                    } else {
                        format!("Error from file-lister(s): {diagnostic}")
                    };
                    return Ok(AgentStep::text(text));
                }

                self.phase = Phase::AwaitingRead;
                Ok(AgentStep::tool_call("read_files", json!({ "paths": self.paths })))
            }
            (Phase::AwaitingRead, Resume::ToolResult(result)) => {
                if let ToolResult::Json { value } = result {
                    self.files = Some(value);
                }
                self.phase = Phase::Done;
                Ok(AgentStep::TurnEnd)
            }
            (Phase::Done, _) => {
                self.phase = Phase::Done;
                Ok(AgentStep::TurnEnd)
            }
            (phase, input) => bail!("file picker resumed with {input:?} while in {phase:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use relay_core::events::RuntimeEvent;
    use relay_core::spawn::SpawnResult;
    use tokio::sync::broadcast;

    use crate::context::RunContext;
    use crate::error::EngineError;
    use crate::registry::ToolRegistry;
    use crate::scheduler::StepScheduler;
    use crate::settings::RuntimeSettings;
    use crate::spawn::{SpawnDispatcher, SubagentContext, SubagentInvoker};
    use crate::tools::spawn_agents::SpawnAgentsTool;

    fn listers_output(items: Value) -> Resume {
        Resume::ToolResult(ToolResult::json(items))
    }

    fn last_message(text: &str) -> Value {
        json!({"agentType": "file-lister", "value": {
            "type": "lastMessage",
            "value": [{"role": "assistant", "content": [{"type": "text", "text": text}]}]
        }})
    }

    #[test]
    fn spawns_one_lister_by_default_and_two_in_max_mode() {
        let mut picker = FilePicker::new(FilePickerMode::Default, "auth", json!({}));
        let step = picker.resume(Resume::Start).unwrap();
        match step {
            AgentStep::ToolCall { tool_name, input } => {
                assert_eq!(tool_name, "spawn_agents");
                assert_eq!(input["agents"].as_array().unwrap().len(), 1);
                assert_eq!(input["agents"][0]["agent_type"], FILE_LISTER);
                assert_eq!(input["agents"][0]["prompt"], "auth");
            }
            other => panic!("unexpected step {other:?}"),
        }

        let mut max = FilePicker::new(FilePickerMode::Max, "auth", json!({"directories": ["src"]}));
        match max.resume(Resume::Start).unwrap() {
            AgentStep::ToolCall { input, .. } => {
                assert_eq!(input["agents"].as_array().unwrap().len(), 2);
                assert_eq!(input["agents"][1]["params"]["directories"][0], "src");
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn merged_paths_are_read() {
        let mut picker = FilePicker::new(FilePickerMode::Max, "auth", json!({}));
        let _ = picker.resume(Resume::Start).unwrap();
        let step = picker
            .resume(listers_output(json!([
                last_message("src/a.ts\nsrc/b.ts"),
                last_message("src/b.ts\n\nsrc/c.ts")
            ])))
            .unwrap();

        assert_eq!(
            step,
            AgentStep::tool_call("read_files", json!({"paths": ["src/a.ts", "src/b.ts", "src/c.ts"]}))
        );
        assert_eq!(picker.paths().len(), 3);
        let end = picker
            .resume(Resume::ToolResult(ToolResult::json(json!({}))))
            .unwrap();
        assert_eq!(end, AgentStep::TurnEnd);
    }

    #[test]
    fn all_errors_produce_joined_diagnostic() {
        let mut picker = FilePicker::new(FilePickerMode::Max, "auth", json!({}));
        let _ = picker.resume(Resume::Start).unwrap();
        let step = picker
            .resume(listers_output(json!([
                {"agentType": "file-lister", "value": {"type": "error", "message": "x"}},
                {"agentType": "file-lister", "value": {"type": "error", "message": "y"}}
            ])))
            .unwrap();
        assert_eq!(step, AgentStep::text("Error from file-lister(s): x; y"));
        assert_eq!(picker.resume(Resume::Continue).unwrap(), AgentStep::TurnEnd);
    }

    #[test]
    fn no_text_and_no_errors_uses_fallback() {
        let mut picker = FilePicker::new(FilePickerMode::Default, "auth", json!({}));
        let _ = picker.resume(Resume::Start).unwrap();
        let step = picker
            .resume(listers_output(json!([last_message("   \n")])))
            .unwrap();
        assert_eq!(
            step,
            AgentStep::text("Error: Could not extract file list from spawned agent(s)")
        );
    }

    #[test]
    fn unexpected_resume_is_a_program_error() {
        let mut picker = FilePicker::new(FilePickerMode::Default, "auth", json!({}));
        assert!(picker.resume(Resume::Continue).is_err());
    }

    struct AlwaysFails;

    #[async_trait]
    impl SubagentInvoker for AlwaysFails {
        async fn invoke(
            &self,
            _request: SpawnRequest,
            _ctx: SubagentContext,
        ) -> Result<SpawnResult, EngineError> {
            Err(EngineError::Internal("lister unavailable".into()))
        }
    }

    #[tokio::test]
    async fn both_listers_failing_ends_turn_after_one_diagnostic() {
        let (tx, mut rx) = broadcast::channel(64);
        let spawner = SpawnDispatcher::new(Arc::new(AlwaysFails), Duration::from_secs(5), tx.clone());
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()).with_spawner(Arc::new(spawner)));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SpawnAgentsTool::new(Duration::from_secs(5))));
        let scheduler = StepScheduler::new(Arc::new(registry), run, tx, &RuntimeSettings::default());

        let mut picker = FilePicker::new(FilePickerMode::Max, "auth", json!({}));
        let report = scheduler.run_turn(&mut picker).await.unwrap();

        assert_eq!(
            report.texts,
            vec!["Error from file-lister(s): lister unavailable; lister unavailable"]
        );
        assert_eq!(report.tool_calls.len(), 1);
        assert_eq!(report.tool_calls[0].tool_name, "spawn_agents");

        let events: Vec<RuntimeEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let step_texts = events.iter().filter(|e| e.event_type() == "step_text").count();
        let tool_starts = events.iter().filter(|e| e.event_type() == "tool_start").count();
        assert_eq!(step_texts, 1);
        assert_eq!(tool_starts, 1);
    }
}
