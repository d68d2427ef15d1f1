use serde::{Deserialize, Serialize};

use crate::message::ChatEntry;
use crate::plan::{ConversationId, PendingPlan, SessionId};

/// The part of the chat state that survives a reload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub session_id: Option<SessionId>,
    pub conversation_id: Option<ConversationId>,
    pub history: Vec<ChatEntry>,
}

/// Read-only view of the coordinator for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub history: Vec<ChatEntry>,
    pub pending_plan: Option<PendingPlan>,
    pub processing: bool,
    pub error: Option<String>,
    pub session_id: Option<SessionId>,
    pub conversation_id: Option<ConversationId>,
}
