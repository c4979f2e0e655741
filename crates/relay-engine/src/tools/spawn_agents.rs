use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use relay_core::spawn::{SpawnEnvelope, SpawnRequest};
use relay_core::tools::{ExecutionMode, ToolError, ToolResult};

use crate::context::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct SpawnAgentsInput {
    agents: Vec<SpawnRequest>,
}

/// Time allowed past the per-agent timeout for a batch to report back.
const SETTLE_GRACE: Duration = Duration::from_secs(30);

/// Runs a batch of sub-agents concurrently and returns one envelope per agent.
pub struct SpawnAgentsTool {
    subagent_timeout: Duration,
}

impl SpawnAgentsTool {
    /// `subagent_timeout` must match the spawner's, so a slow child fails
    /// in its own slot before the whole call times out.
    pub fn new(subagent_timeout: Duration) -> Self {
        Self { subagent_timeout }
    }
}

#[async_trait]
impl Tool for SpawnAgentsTool {
    fn name(&self) -> &str {
        "spawn_agents"
    }

    fn description(&self) -> &str {
        "Spawn sub-agents in parallel and collect their outputs"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["agents"],
            "properties": {
                "agents": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["agent_type"],
                        "properties": {
                            "agent_type": {"type": "string"},
                            "prompt": {"type": "string"},
                            "params": {"type": "object"}
                        }
                    }
                }
            }
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.subagent_timeout + SETTLE_GRACE)
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let SpawnAgentsInput { agents } = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let spawner = ctx
            .run
            .spawner
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionFailed("sub-agent spawning is not available".into()))?;

        let agent_types: Vec<String> = agents.iter().map(|a| a.agent_type.clone()).collect();
        let results = spawner.spawn_all(agents, &ctx.run, &ctx.agent_id).await;

        ctx.ordering.finished().await;

        let envelopes = agent_types
            .into_iter()
            .zip(results)
            .map(|(agent_type, value)| SpawnEnvelope { agent_type, value })
            .collect::<Vec<_>>();
        let value = serde_json::to_value(envelopes)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolResult::json(value))
    }
}
