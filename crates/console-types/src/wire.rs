//! Request/response bodies of the completion endpoint (`POST /chat/completion`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::EntryKind;
use crate::plan::{ConversationId, PendingPlan, Plan, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub is_approval: bool,
    /// Required when `is_approval` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl CompletionRequest {
    /// A fresh user message asking the backend for a plan
    pub fn message(text: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            messages: vec![WireMessage { kind: EntryKind::User, content: text.into() }],
            conversation_id,
            is_approval: false,
            session_id: None,
        }
    }

    /// Approval of a pending plan
    pub fn approval(pending: &PendingPlan, conversation_id: Option<ConversationId>) -> Self {
        Self {
            messages: vec![WireMessage { kind: EntryKind::User, content: pending.query.clone() }],
            conversation_id,
            is_approval: true,
            session_id: Some(pending.session_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// What a completion response means to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Plan {
        plan: Plan,
        session_id: SessionId,
        conversation_id: Option<ConversationId>,
    },
    /// Approval accepted; the result will arrive over the realtime channel
    Processing,
    Failed(String),
    /// Neither a plan, an accepted approval, nor an error
    Unrecognised,
}

pub const STATUS_PROCESSING: &str = "processing";

impl CompletionResponse {
    pub fn plan(plan: Plan, session_id: SessionId, conversation_id: Option<ConversationId>) -> Self {
        Self {
            plan: Some(serde_json::to_value(plan).unwrap_or(Value::Null)),
            session_id: Some(session_id),
            conversation_id,
            ..Self::default()
        }
    }

    pub fn processing() -> Self {
        Self {
            status: Some(STATUS_PROCESSING.to_string()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(Value::String(message.into())),
            ..Self::default()
        }
    }

    /// Errors win over everything else in the body.
    pub fn into_outcome(self) -> CompletionOutcome {
        if let Some(error) = self.error.filter(|e| !e.is_null()) {
            return CompletionOutcome::Failed(error_text(error));
        }
        if let (Some(plan), Some(session_id)) = (self.plan.filter(|p| !p.is_null()), self.session_id) {
            return CompletionOutcome::Plan {
                plan: Plan::from(plan),
                session_id,
                conversation_id: self.conversation_id,
            };
        }
        if self.status.as_deref() == Some(STATUS_PROCESSING) {
            return CompletionOutcome::Processing;
        }
        CompletionOutcome::Unrecognised
    }
}

/// Error fields come as plain strings or `{ message }` objects
pub fn error_text(error: Value) -> String {
    match error {
        Value::String(s) => s,
        Value::Object(ref map) => match map.get("message").and_then(Value::as_str) {
            Some(m) => m.to_string(),
            None => error.to_string(),
        },
        other => other.to_string(),
    }
}
