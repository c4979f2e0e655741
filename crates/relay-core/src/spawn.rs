use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::Message;

/// A request to run one sub-agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub agent_type: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub params: Value,
}

impl SpawnRequest {
    pub fn new(agent_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            prompt: prompt.into(),
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Raw output of one sub-agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpawnResult {
    /// Transcript of the sub-agent's turn, oldest first.
    #[serde(rename = "lastMessage")]
    LastMessage { value: Vec<Message> },
    #[serde(rename = "json")]
    Json { value: Value },
    #[serde(rename = "error")]
    Error { message: String },
}

impl SpawnResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Lenient parse of a single (already unwrapped) sub-agent output.
    ///
    /// Outputs from foreign agents are not guaranteed to match the typed
    /// shape: a `lastMessage` whose value is not a list carries no
    /// messages, an `error` whose `message` is missing falls back to a
    /// string `value`, and anything without a known `type` is `None`.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        match obj.get("type").and_then(Value::as_str)? {
            "lastMessage" => {
                let messages = obj
                    .get("value")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Message::from_wire).collect())
                    .unwrap_or_default();
                Some(Self::LastMessage { value: messages })
            }
            "json" => Some(Self::Json {
                value: obj.get("value").cloned().unwrap_or(Value::Null),
            }),
            "error" => {
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| obj.get("value").and_then(Value::as_str))
                    .unwrap_or_default();
                Some(Self::error(message))
            }
            _ => None,
        }
    }
}

/// Wire envelope the spawn tool puts around each sub-agent output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnEnvelope {
    pub agent_type: String,
    pub value: SpawnResult,
}
