//! Shared types for the relay agent runtime: identifiers, messages, steps,
//! tool calls and results, spawn outputs and runtime events.

pub mod events;
pub mod ids;
pub mod messages;
pub mod spawn;
pub mod steps;
pub mod tools;
