use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Typed by the user, or synthesised from rejection feedback
    User,
    /// Outcome of an approved plan, delivered over the realtime channel
    Result,
}

/// Content of a history entry: plain text or the backend's structured payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryContent {
    Text(String),
    Payload(Value),
}

impl EntryContent {
    /// Best-effort text for display. Payloads expose their `text` field if any.
    pub fn as_text(&self) -> &str {
        match self {
            EntryContent::Text(s) => s,
            EntryContent::Payload(v) => v.get("text").and_then(Value::as_str).unwrap_or(""),
        }
    }
}

/// A single chat history entry. Entries are immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub content: EntryContent,
    pub created_at: String,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(EntryKind::User, EntryContent::Text(text.into()))
    }

    pub fn result(payload: Value) -> Self {
        let content = match payload {
            Value::String(s) => EntryContent::Text(s),
            other => EntryContent::Payload(other),
        };
        Self::new(EntryKind::Result, content)
    }

    fn new(kind: EntryKind, content: EntryContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
