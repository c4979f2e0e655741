//! # relay
//!
//! Command-line front end for the relay agent runtime: runs the built-in
//! file picker against a directory, or proposes a file edit and prints
//! the resulting diff.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use relay_core::tools::ToolResult;
use relay_engine::programs::{FilePicker, FilePickerMode};
use relay_engine::settings::{load_settings, load_settings_from_path};
use relay_engine::Runtime;
use relay_telemetry::{init_telemetry, TelemetryConfig};

/// Relay agent runtime.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relay agent runtime")]
struct Cli {
    /// Settings JSON file, merged over the defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find files relevant to a prompt and read them.
    PickFiles {
        /// Directory to search.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// What to look for.
        #[arg(long)]
        prompt: String,

        /// Spawn two file-listers instead of one.
        #[arg(long)]
        max: bool,
    },
    /// Print the built-in tool definitions as JSON.
    Tools,
    /// Propose new content for a file and print the diff.
    Propose {
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// File to propose, relative to the root.
        #[arg(long)]
        path: String,

        /// File holding the proposed content.
        #[arg(long)]
        content_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        json: cli.json_logs,
        ..TelemetryConfig::default()
    });

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::PickFiles { root, prompt, max } => {
            let runtime = Runtime::new(settings, root);
            log_events(&runtime);
            let mode = if max {
                FilePickerMode::Max
            } else {
                FilePickerMode::Default
            };
            let mut picker = FilePicker::new(mode, prompt, serde_json::json!({}));
            let report = runtime.run_program(&mut picker, cancel).await?;

            for text in &report.texts {
                eprintln!("{text}");
            }
            for path in picker.paths() {
                println!("{path}");
            }
            if let Some(files) = picker.files().and_then(Value::as_object) {
                for (path, content) in files {
                    println!("\n==> {path} <==");
                    match content.as_str() {
                        Some(text) => println!("{text}"),
                        None => println!("(unreadable)"),
                    }
                }
            }
        }
        Command::Tools => {
            let runtime = Runtime::new(settings, ".");
            let definitions = serde_json::to_string_pretty(&runtime.tools().definitions())
                .context("failed to render tool definitions")?;
            println!("{definitions}");
        }
        Command::Propose {
            root,
            path,
            content_file,
        } => {
            let content = tokio::fs::read_to_string(&content_file)
                .await
                .with_context(|| format!("failed to read {}", content_file.display()))?;
            let runtime = Runtime::new(settings, root);
            log_events(&runtime);
            let run = runtime.new_run(cancel);
            let result = runtime
                .dispatcher(run.clone())
                .dispatch(
                    "propose_write_file",
                    serde_json::json!({ "path": path, "content": content }),
                )
                .await;
            run.discard_proposals();

            match result {
                ToolResult::Json { value } => {
                    println!("{}", value["message"].as_str().unwrap_or_default());
                    print!("{}", value["unifiedDiff"].as_str().unwrap_or_default());
                }
                ToolResult::Text { text } => println!("{text}"),
                ToolResult::Error { message } => bail!("{message}"),
            }
        }
    }

    Ok(())
}

/// Forward runtime events to the debug log for the life of the process.
fn log_events(runtime: &Runtime) {
    let mut events = runtime.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(event_type = event.event_type(), run_id = %event.run_id(), "runtime event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
