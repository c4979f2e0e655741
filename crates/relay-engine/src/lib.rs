//! Agent step runtime: drives resumable agent programs, dispatches their
//! tool calls in order, fans spawn requests out to concurrent sub-agents
//! and keeps speculative file edits per run.

pub mod context;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod ordering;
pub mod programs;
pub mod proposed;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod spawn;
pub mod tools;

pub use context::{RunContext, Tool, ToolContext};
pub use error::EngineError;
pub use runtime::Runtime;
pub use scheduler::{AgentProgram, StepScheduler, TurnReport};
pub use settings::RuntimeSettings;
