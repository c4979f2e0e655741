//! Built-in agent programs.

pub mod file_lister;
pub mod file_picker;

use std::collections::HashSet;
use std::sync::Arc;

use relay_core::spawn::SpawnRequest;

use crate::invoker::ProgramInvoker;
use crate::registry::ToolFilter;
use crate::scheduler::AgentProgram;

pub use file_lister::FileLister;
pub use file_picker::{FilePicker, FilePickerMode};

pub const FILE_LISTER: &str = "file-lister";
pub const FILE_PICKER: &str = "file-picker";
pub const FILE_PICKER_MAX: &str = "file-picker-max";

/// Register the built-in programs as spawnable agent types.
pub fn register_builtin_programs(invoker: &mut ProgramInvoker) {
    let only = |names: &[&str]| ToolFilter::Explicit(names.iter().map(|n| n.to_string()).collect::<HashSet<_>>());

    invoker.register_with_tools(
        FILE_LISTER,
        Arc::new(|req: &SpawnRequest| Box::new(FileLister::from_request(req)) as Box<dyn AgentProgram>),
        &only(&["list_files"]),
    );
    invoker.register_with_tools(
        FILE_PICKER,
        Arc::new(|req: &SpawnRequest| {
            Box::new(FilePicker::from_request(FilePickerMode::Default, req)) as Box<dyn AgentProgram>
        }),
        &only(&["spawn_agents", "read_files"]),
    );
    invoker.register_with_tools(
        FILE_PICKER_MAX,
        Arc::new(|req: &SpawnRequest| {
            Box::new(FilePicker::from_request(FilePickerMode::Max, req)) as Box<dyn AgentProgram>
        }),
        &only(&["spawn_agents", "read_files"]),
    );
}
