use serde::{Deserialize, Serialize};

use crate::message::ChatEntry;
use crate::plan::{PendingPlan, SessionId};

/// Events emitted by the chat coordinator.
/// The presentation layer drains these for reactive updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// An entry was appended to the history
    HistoryAppended { entry: ChatEntry },

    /// The backend proposed a plan and is waiting for approval
    PlanReceived { pending: PendingPlan },

    /// The user turned the pending plan down
    PlanRejected { feedback: String },

    /// Approval sent; waiting for the realtime result
    ProcessingStarted { session_id: SessionId },

    /// A plan cycle finished (result, error, or empty result)
    Resolved { session_id: SessionId, success: bool },

    /// No result arrived before the approval timeout
    TimedOut { session_id: SessionId },

    /// A user-facing error was set
    Error { message: String },

    /// A realtime result for a session we no longer track was dropped
    StaleEventDropped { session_id: SessionId },

    /// A persistence checkpoint failed
    PersistFailed { message: String },

    /// History and identities were cleared
    Reset,
}
