use serde_json::Value;

use crate::tools::ToolResult;

/// One unit an agent program yields to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentStep {
    /// Invoke a tool; the program is resumed with its result.
    ToolCall { tool_name: String, input: Value },
    /// Diagnostic text for the turn's output; carries no tool invocation.
    Text { text: String },
    /// Nothing further to emit this turn.
    TurnEnd,
}

impl AgentStep {
    pub fn tool_call(tool_name: impl Into<String>, input: Value) -> Self {
        Self::ToolCall {
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::Text { .. } => "text",
            Self::TurnEnd => "turn_end",
        }
    }
}

/// Value a program is resumed with.
#[derive(Clone, Debug, PartialEq)]
pub enum Resume {
    /// First resume of the turn.
    Start,
    /// Previous step was text; there is no new input.
    Continue,
    /// Result of the tool call the program yielded last.
    ToolResult(ToolResult),
}
