use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque token issued by the completion API; scopes one plan-approval cycle
/// and names the realtime room its result is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// Conversation identity. The backend hands out numbers or strings;
/// whichever it sent is what we send back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Number(n) => write!(f, "{}", n),
            ConversationId::Text(s) => f.write_str(s),
        }
    }
}

/// A backend-proposed action that needs human approval before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Everything else the backend attached (steps, tool calls, ...)
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Plan {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            details: Map::new(),
        }
    }
}

impl From<Value> for Plan {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let description = match map.remove("description") {
                    Some(Value::String(s)) => Some(s),
                    Some(other) => {
                        map.insert("description".to_string(), other);
                        None
                    }
                    None => None,
                };
                Plan { description, details: map }
            }
            Value::String(s) => Plan::new(s),
            Value::Null => Plan { description: None, details: Map::new() },
            other => {
                let mut details = Map::new();
                details.insert("body".to_string(), other);
                Plan { description: None, details }
            }
        }
    }
}

/// A plan waiting for the user's decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPlan {
    pub plan: Plan,
    pub session_id: SessionId,
    /// The user message that produced this plan
    pub query: String,
}
