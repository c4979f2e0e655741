use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, RunId, ToolCallId};

/// Events emitted while a turn is driven. This is the turn's output stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeEvent {
    #[serde(rename = "turn_start")]
    TurnStart { run_id: RunId, agent_id: AgentId },

    #[serde(rename = "step_text")]
    StepText {
        run_id: RunId,
        agent_id: AgentId,
        text: String,
    },

    #[serde(rename = "tool_start")]
    ToolStart {
        run_id: RunId,
        agent_id: AgentId,
        tool_call_id: ToolCallId,
        tool_name: String,
    },

    #[serde(rename = "tool_end")]
    ToolEnd {
        run_id: RunId,
        agent_id: AgentId,
        tool_call_id: ToolCallId,
        is_error: bool,
        result_preview: String,
        duration_ms: u64,
    },

    #[serde(rename = "turn_end")]
    TurnEnd {
        run_id: RunId,
        agent_id: AgentId,
        steps: u32,
    },

    #[serde(rename = "subagent_spawned")]
    SubagentSpawned {
        run_id: RunId,
        parent_agent_id: AgentId,
        child_agent_id: AgentId,
        agent_type: String,
    },

    #[serde(rename = "subagent_complete")]
    SubagentComplete {
        run_id: RunId,
        parent_agent_id: AgentId,
        child_agent_id: AgentId,
        is_error: bool,
    },
}

impl RuntimeEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::TurnStart { run_id, .. }
            | Self::StepText { run_id, .. }
            | Self::ToolStart { run_id, .. }
            | Self::ToolEnd { run_id, .. }
            | Self::TurnEnd { run_id, .. }
            | Self::SubagentSpawned { run_id, .. }
            | Self::SubagentComplete { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStart { .. } => "turn_start",
            Self::StepText { .. } => "step_text",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::TurnEnd { .. } => "turn_end",
            Self::SubagentSpawned { .. } => "subagent_spawned",
            Self::SubagentComplete { .. } => "subagent_complete",
        }
    }
}
