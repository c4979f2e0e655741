//! Runtime settings.
//!
//! Loaded in three layers, lowest priority first:
//! 1. compiled defaults ([`RuntimeSettings::default`])
//! 2. a JSON file deep-merged over the defaults
//! 3. `RELAY_*` environment variables

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {var}: {value}")]
    Env { var: String, value: String },
}

/// Settings that shape how turns, tool calls and spawns are driven.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Upper bound on a single tool handler, in milliseconds.
    pub tool_timeout_ms: u64,
    /// Upper bound on a single sub-agent run, in milliseconds.
    pub subagent_timeout_ms: u64,
    /// Steps a program may yield in one turn before it is stopped.
    pub max_steps_per_turn: u32,
    /// How many levels of sub-agents may be nested below a root run.
    pub max_spawn_depth: u32,
    /// Capacity of the runtime event broadcast channel.
    pub event_buffer_size: usize,
    pub file_lister: FileListerSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 120_000,
            subagent_timeout_ms: 600_000,
            max_steps_per_turn: 50,
            max_spawn_depth: 2,
            event_buffer_size: 1024,
            file_lister: FileListerSettings::default(),
        }
    }
}

impl RuntimeSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn subagent_timeout(&self) -> Duration {
        Duration::from_millis(self.subagent_timeout_ms)
    }
}

/// Settings for the built-in `file-lister` sub-agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileListerSettings {
    /// Maximum paths reported per listing.
    pub max_results: usize,
    /// Directory names never descended into.
    pub ignored_dirs: Vec<String>,
}

impl Default for FileListerSettings {
    fn default() -> Self {
        Self {
            max_results: 12,
            ignored_dirs: vec![
                ".git".into(),
                "node_modules".into(),
                "target".into(),
                "dist".into(),
            ],
        }
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// every other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from a JSON file over the defaults, then apply env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<RuntimeSettings, SettingsError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let overlay: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(RuntimeSettings::default())?;
    let mut settings: RuntimeSettings = serde_json::from_value(deep_merge(defaults, overlay))?;
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    Ok(settings)
}

/// Defaults plus env overrides, for runs without a settings file.
pub fn load_settings() -> Result<RuntimeSettings, SettingsError> {
    let mut settings = RuntimeSettings::default();
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut RuntimeSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    fn parse<T: std::str::FromStr>(var: &str, value: String) -> Result<T, SettingsError> {
        value
            .trim()
            .parse()
            .map_err(|_| SettingsError::Env {
                var: var.to_string(),
                value,
            })
    }

    if let Some(v) = lookup("RELAY_TOOL_TIMEOUT_MS") {
        settings.tool_timeout_ms = parse("RELAY_TOOL_TIMEOUT_MS", v)?;
    }
    if let Some(v) = lookup("RELAY_SUBAGENT_TIMEOUT_MS") {
        settings.subagent_timeout_ms = parse("RELAY_SUBAGENT_TIMEOUT_MS", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_STEPS_PER_TURN") {
        settings.max_steps_per_turn = parse("RELAY_MAX_STEPS_PER_TURN", v)?;
    }
    if let Some(v) = lookup("RELAY_MAX_SPAWN_DEPTH") {
        settings.max_spawn_depth = parse("RELAY_MAX_SPAWN_DEPTH", v)?;
    }
    Ok(())
}
