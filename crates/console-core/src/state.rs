//! Coordinator state machine.
//!
//! `Phase` makes "pending plan" and "processing" mutually exclusive: approving
//! moves the plan out of `AwaitingApproval` into the in-flight `Approval`.
//! `resolve` is the single arbitration point for ending a plan cycle; the
//! approval response, the timeout and the realtime result all go through it.
//! An approval trigger only counts while its own approval is in flight. A
//! realtime result for the current session always applies, even with no
//! cycle open: after a reload or a timeout the backend may still deliver.

use console_types::{
    message::ChatEntry,
    plan::{ConversationId, PendingPlan, SessionId},
    session::{ChatSnapshot, ChatView},
};
use serde_json::Value;

use crate::ports::TimerHandle;

pub const TIMEOUT_ERROR: &str = "Request timeout. The server took too long to respond.";

#[derive(Debug)]
pub(crate) enum Phase {
    Idle,
    AwaitingApproval(PendingPlan),
    Processing(Approval),
}

#[derive(Debug)]
pub(crate) struct Approval {
    pub token: u64,
    pub plan: PendingPlan,
    pub timer: Option<TimerHandle>,
}

/// Who is trying to close the current plan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The approval request itself or its timeout; only valid for that approval
    Approval(u64),
    /// A `chat:plan:result` for the current session
    Realtime,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Failed(String),
    Completed(Value),
    /// Result carried neither an error nor a completed payload
    Empty,
    TimedOut,
}

/// Effects of a resolution, applied by the caller after the borrow ends
#[derive(Debug)]
pub(crate) struct Resolution {
    pub session_id: SessionId,
    pub timer: Option<TimerHandle>,
    pub entry: Option<ChatEntry>,
    pub error: Option<String>,
    pub timed_out: bool,
}

pub(crate) struct ChatState {
    pub phase: Phase,
    pub session_id: Option<SessionId>,
    pub conversation_id: Option<ConversationId>,
    pub history: Vec<ChatEntry>,
    pub error: Option<String>,
    request_seq: u64,
    approval_seq: u64,
}

impl ChatState {
    pub fn restore(snapshot: ChatSnapshot) -> Self {
        Self {
            phase: Phase::Idle,
            session_id: snapshot.session_id,
            conversation_id: snapshot.conversation_id,
            history: snapshot.history,
            error: None,
            request_seq: 0,
            approval_seq: 0,
        }
    }

    /// Issue a new request token; older tokens become stale.
    pub fn next_request(&mut self) -> u64 {
        self.request_seq += 1;
        self.request_seq
    }

    pub fn is_latest_request(&self, token: u64) -> bool {
        self.request_seq == token
    }

    pub fn next_approval(&mut self) -> u64 {
        self.approval_seq += 1;
        self.approval_seq
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.phase, Phase::Processing(_))
    }

    pub fn is_processing_approval(&self, token: u64) -> bool {
        matches!(&self.phase, Phase::Processing(a) if a.token == token)
    }

    pub fn pending_plan(&self) -> Option<&PendingPlan> {
        match &self.phase {
            Phase::AwaitingApproval(p) => Some(p),
            _ => None,
        }
    }

    /// Drop whatever cycle is open. Returns the timer that must be cancelled.
    pub fn abandon(&mut self) -> Option<TimerHandle> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Processing(approval) => approval.timer,
            _ => None,
        }
    }

    pub fn resolve(&mut self, trigger: Trigger, outcome: Outcome) -> Option<Resolution> {
        let open = match (&self.phase, trigger) {
            (Phase::Processing(a), Trigger::Approval(token)) => a.token == token,
            (_, Trigger::Realtime) => self.session_id.is_some(),
            _ => false,
        };
        if !open {
            return None;
        }

        let (session_id, timer, late) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Processing(a) => (a.plan.session_id, a.timer, false),
            Phase::AwaitingApproval(p) => (p.session_id, None, false),
            // Nothing in flight: a resumed session or a result after the timeout
            Phase::Idle => (self.session_id.clone()?, None, true),
        };

        let mut resolution = Resolution {
            session_id,
            timer,
            entry: None,
            error: None,
            timed_out: false,
        };
        match outcome {
            Outcome::Failed(message) => resolution.error = Some(message),
            Outcome::TimedOut => {
                resolution.error = Some(TIMEOUT_ERROR.to_string());
                resolution.timed_out = true;
            }
            Outcome::Completed(payload) => {
                // The work finished after all
                if late && self.error.as_deref() == Some(TIMEOUT_ERROR) {
                    self.error = None;
                }
                let entry = ChatEntry::result(payload);
                self.history.push(entry.clone());
                resolution.entry = Some(entry);
            }
            Outcome::Empty => {}
        }
        if let Some(error) = &resolution.error {
            self.error = Some(error.clone());
        }
        Some(resolution)
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            session_id: self.session_id.clone(),
            conversation_id: self.conversation_id.clone(),
            history: self.history.clone(),
        }
    }

    pub fn view(&self) -> ChatView {
        ChatView {
            history: self.history.clone(),
            pending_plan: self.pending_plan().cloned(),
            processing: self.is_processing(),
            error: self.error.clone(),
            session_id: self.session_id.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }
}
