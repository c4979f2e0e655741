//! Normalizes the outputs of a spawn batch.
//!
//! Sub-agent outputs arrive in several shapes: bare `lastMessage`/`json`/
//! `error` results, or any of those wrapped in a `{ value }` envelope. The
//! functions here unwrap them, pull the last assistant text out of every
//! transcript, collect error messages, and decide whether the batch is
//! usable at all.

use std::collections::HashSet;

use serde_json::Value;

use relay_core::messages::Role;
use relay_core::spawn::SpawnResult;
use relay_core::tools::ToolResult;

/// Normalized view of one spawn batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconciledBatch {
    /// Non-empty texts, in batch order.
    pub extracted_texts: Vec<String>,
    pub errors: Vec<String>,
    pub has_any_usable_result: bool,
}

impl ReconciledBatch {
    /// Errors joined with `"; "`, or `fallback` when there are none.
    pub fn diagnostic(&self, fallback: &str) -> String {
        if self.errors.is_empty() {
            fallback.to_string()
        } else {
            self.errors.join("; ")
        }
    }

    /// Newline-split path candidates across all texts, trimmed, without
    /// blanks or duplicates. First occurrence wins.
    pub fn paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.extracted_texts
            .iter()
            .flat_map(|text| text.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(line.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// Raw per-agent outputs carried by a spawn tool result.
///
/// A JSON array yields its items, any other truthy JSON value yields
/// itself. Text and error results carry no sub-agent outputs.
pub fn extract_spawn_results(result: &ToolResult) -> Vec<Value> {
    match result {
        ToolResult::Json { value: Value::Array(items) } => items.clone(),
        ToolResult::Json { value } if is_truthy(value) => vec![value.clone()],
        _ => Vec::new(),
    }
}

/// Strip a generic `{ value }` envelope unless the object is itself a
/// `lastMessage` or `error` result. Non-objects yield `None`.
pub fn unwrap_envelope(raw: &Value) -> Option<&Value> {
    let obj = raw.as_object()?;
    let tag = obj.get("type").and_then(Value::as_str);
    match obj.get("value") {
        Some(inner) if !matches!(tag, Some("lastMessage" | "error")) => {
            is_truthy(inner).then_some(inner)
        }
        _ => Some(raw),
    }
}

/// Text of the most recent assistant message that has a text part.
pub fn extract_last_message_text(result: &SpawnResult) -> Option<&str> {
    match result {
        SpawnResult::LastMessage { value } => value
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| m.first_text()),
        _ => None,
    }
}

/// Message of an error result, if non-empty.
pub fn extract_error_message(result: &SpawnResult) -> Option<&str> {
    match result {
        SpawnResult::Error { message } if !message.is_empty() => Some(message.as_str()),
        _ => None,
    }
}

/// Reconcile raw sub-agent outputs as they come off the wire.
pub fn reconcile(raw: &[Value]) -> ReconciledBatch {
    let results: Vec<SpawnResult> = raw
        .iter()
        .filter_map(unwrap_envelope)
        .filter_map(SpawnResult::from_wire)
        .collect();
    reconcile_results(&results)
}

/// Reconcile already-typed sub-agent outputs.
pub fn reconcile_results(results: &[SpawnResult]) -> ReconciledBatch {
    let mut batch = ReconciledBatch::default();
    for result in results {
        if let Some(text) = extract_last_message_text(result).filter(|t| !t.is_empty()) {
            batch.extracted_texts.push(text.to_string());
        }
        if let Some(message) = extract_error_message(result) {
            batch.errors.push(message.to_string());
        }
    }
    batch.has_any_usable_result = !batch.extracted_texts.is_empty();
    batch
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
