//! Realtime channel protocol.
//!
//! Frames are JSON text messages of the shape `{ "event": <name>, "data": <payload> }`.
//! The client only ever joins/leaves rooms; the server pushes plan results
//! into the room named after the session id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::SessionId;
use crate::wire::error_text;
use crate::Result;

pub const PLAN_RESULT_EVENT: &str = "chat:plan:result";
pub const STATUS_COMPLETED: &str = "completed";

/// Payload of `chat:plan:result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResultEvent {
    #[serde(default)]
    pub status: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// How a matching plan result should be applied
#[derive(Debug, Clone, PartialEq)]
pub enum ResultKind {
    Failed(String),
    Completed(Value),
    /// Neither an error nor a completed result; only the pending plan is dropped
    Empty,
}

impl PlanResultEvent {
    pub fn completed(session_id: SessionId, result: Value) -> Self {
        Self {
            status: STATUS_COMPLETED.to_string(),
            session_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(session_id: SessionId, error: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            session_id,
            result: None,
            error: Some(Value::String(error.into())),
        }
    }

    pub fn kind(&self) -> ResultKind {
        if let Some(error) = self.error.clone().filter(|e| !e.is_null()) {
            return ResultKind::Failed(error_text(error));
        }
        match &self.result {
            Some(result) if self.status == STATUS_COMPLETED && !result.is_null() => {
                ResultKind::Completed(result.clone())
            }
            _ => ResultKind::Empty,
        }
    }
}

/// Client → server frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// Join a room: a session id or a user id
    #[serde(rename = "join")]
    Join(String),
    #[serde(rename = "leave")]
    Leave(String),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server → client frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    #[serde(rename = "chat:plan:result")]
    PlanResult(PlanResultEvent),
}

impl ServerFrame {
    /// Fails on unknown event names; callers treat that as "not for us".
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Events delivered to channel listeners
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected { reason: String },
    PlanResult(PlanResultEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeEventKind {
    Connected,
    Disconnected,
    PlanResult,
}

impl RealtimeEvent {
    pub fn kind(&self) -> RealtimeEventKind {
        match self {
            RealtimeEvent::Connected => RealtimeEventKind::Connected,
            RealtimeEvent::Disconnected { .. } => RealtimeEventKind::Disconnected,
            RealtimeEvent::PlanResult(_) => RealtimeEventKind::PlanResult,
        }
    }
}

impl From<ServerFrame> for RealtimeEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::PlanResult(ev) => RealtimeEvent::PlanResult(ev),
        }
    }
}

impl RealtimeEventKind {
    pub fn label(&self) -> &str {
        match self {
            RealtimeEventKind::Connected => "connect",
            RealtimeEventKind::Disconnected => "disconnect",
            RealtimeEventKind::PlanResult => PLAN_RESULT_EVENT,
        }
    }
}
