use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a message in a sub-agent transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".into(),
            Role::Assistant => "assistant".into(),
            Role::System => "system".into(),
            Role::Tool => "tool".into(),
            Role::Other(s) => s,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    /// Images, tool calls, reasoning blocks: carried but never read.
    #[serde(other)]
    Other,
}

/// One role-tagged message of a `lastMessage` output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Lenient parse of a message produced by an arbitrary sub-agent.
    ///
    /// Returns `None` unless the value has a string `role` and an array
    /// `content`. Content parts that do not parse are kept as `Other`.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let role = Role::from(obj.get("role")?.as_str()?.to_string());
        let content = obj
            .get("content")?
            .as_array()?
            .iter()
            .map(|part| {
                serde_json::from_value::<ContentPart>(part.clone()).unwrap_or(ContentPart::Other)
            })
            .collect();
        Some(Self { role, content })
    }

    /// First text part of this message, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
    }
}
