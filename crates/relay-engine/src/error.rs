use relay_core::tools::ToolError;

use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The agent program itself failed while producing a step.
    #[error(transparent)]
    Program(anyhow::Error),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("agent aborted")]
    Aborted,

    #[error("max steps exceeded: {0}")]
    MaxStepsExceeded(u32),

    #[error("maximum spawn depth ({0}) exceeded")]
    SpawnDepthExceeded(u32),

    #[error("unknown agent type: {0}")]
    UnknownAgent(String),

    #[error("{0}")]
    Internal(String),
}
