//! Chat coordinator: one human-in-the-loop plan-approval cycle at a time.
//!
//! Lifecycle:
//! 1. `send_message`: append the user turn, ask the backend for a plan
//! 2. The backend answers with a plan + session id; join that session's room
//! 3. `approve_plan` posts the approval and arms a timeout, or
//!    `reject_plan` drops the plan locally
//! 4. A `chat:plan:result` for the current session (or the timeout) closes the cycle
//!
//! All entry points run on the single WASM thread. Shared state is only
//! borrowed between awaits, never across one.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use console_types::{
    ConsoleError,
    config::ConsoleConfig,
    event::ChatEvent,
    message::ChatEntry,
    plan::{ConversationId, PendingPlan, SessionId},
    realtime::{PlanResultEvent, RealtimeEvent, RealtimeEventKind, ResultKind},
    session::ChatView,
    wire::{CompletionOutcome, CompletionRequest},
};

use crate::event_bus::EventBus;
use crate::ports::*;
use crate::state::{Approval, ChatState, Outcome, Phase, Resolution, Trigger};
use crate::store::ChatStore;

pub use crate::state::TIMEOUT_ERROR;

pub const AUTH_ERROR: &str = "User not authenticated.";
pub const SEND_FAILED: &str = "Failed to send message. Please try again.";
pub const APPROVE_FAILED: &str = "Failed to approve plan. Please try again.";
pub const DEFAULT_REJECTION: &str = "Plan rejected.";

/// Everything the coordinator talks to
#[derive(Clone)]
pub struct ChatPorts {
    pub completion: Rc<dyn CompletionPort>,
    pub realtime: Rc<dyn RealtimePort>,
    pub storage: Rc<dyn StoragePort>,
    pub credentials: Rc<dyn CredentialPort>,
    pub timer: Rc<dyn TimerPort>,
}

pub struct ChatCoordinator {
    inner: Rc<Inner>,
    listener: ListenerId,
}

struct Inner {
    state: RefCell<ChatState>,
    completion: Rc<dyn CompletionPort>,
    realtime: Rc<dyn RealtimePort>,
    credentials: Rc<dyn CredentialPort>,
    timer: Rc<dyn TimerPort>,
    store: ChatStore,
    event_bus: EventBus,
    approval_timeout_ms: u64,
}

impl ChatCoordinator {
    /// Restore persisted state, subscribe to plan results, and re-join the
    /// user's room and the last session's room.
    pub fn new(ports: ChatPorts, config: &ConsoleConfig, event_bus: EventBus) -> Self {
        let store = ChatStore::new(ports.storage.clone(), config.storage.keys.clone());
        let snapshot = store.load();
        log::info!(
            "Chat restored from {}: {} entries, session {:?}",
            store.backend_name(),
            snapshot.history.len(),
            snapshot.session_id.as_ref().map(SessionId::as_str),
        );

        let inner = Rc::new(Inner {
            state: RefCell::new(ChatState::restore(snapshot)),
            completion: ports.completion,
            realtime: ports.realtime,
            credentials: ports.credentials,
            timer: ports.timer,
            store,
            event_bus,
            approval_timeout_ms: config.approval_timeout_ms,
        });

        let weak: Weak<Inner> = Rc::downgrade(&inner);
        let listener = inner.realtime.on(
            RealtimeEventKind::PlanResult,
            Box::new(move |event: &RealtimeEvent| {
                if let (Some(inner), RealtimeEvent::PlanResult(result)) = (weak.upgrade(), event) {
                    inner.on_plan_result(result);
                }
            }),
        );

        inner.rejoin_rooms();
        Self { inner, listener }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn view(&self) -> ChatView {
        self.inner.state.borrow().view()
    }

    pub fn pending_plan(&self) -> Option<PendingPlan> {
        self.inner.state.borrow().pending_plan().cloned()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.borrow().is_processing()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn history(&self) -> Vec<ChatEntry> {
        self.inner.state.borrow().history.clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.state.borrow().session_id.clone()
    }

    /// Submit a user message and wait for the backend's plan.
    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let inner = &self.inner;
        let Some(credential) = inner.credentials.credential() else {
            inner.fail(AUTH_ERROR);
            return;
        };

        let (token, entry, stale_timer) = {
            let mut st = inner.state.borrow_mut();
            st.error = None;
            let stale_timer = st.abandon();
            let token = st.next_request();
            let entry = ChatEntry::user(text);
            st.history.push(entry.clone());
            (token, entry, stale_timer)
        };
        if let Some(handle) = stale_timer {
            inner.timer.cancel(handle);
        }
        inner.event_bus.emit(ChatEvent::HistoryAppended { entry });
        inner.checkpoint();

        // The stored id may have been updated by another tab or a previous turn
        let req = CompletionRequest::message(text, inner.refresh_conversation_id());
        let result = inner.completion.complete(req, &credential).await;

        if !inner.state.borrow().is_latest_request(token) {
            log::debug!("Dropping completion response for superseded request {}", token);
            return;
        }

        match result {
            Ok(response) => match response.into_outcome() {
                CompletionOutcome::Plan { plan, session_id, conversation_id } => {
                    let pending = PendingPlan {
                        plan,
                        session_id: session_id.clone(),
                        query: text.to_string(),
                    };
                    let previous = {
                        let mut st = inner.state.borrow_mut();
                        let previous = st.session_id.replace(session_id.clone());
                        if conversation_id.is_some() {
                            st.conversation_id = conversation_id;
                        }
                        st.phase = Phase::AwaitingApproval(pending.clone());
                        previous
                    };
                    inner.checkpoint();
                    inner.switch_room(previous.as_ref(), &session_id);
                    inner.event_bus.emit(ChatEvent::PlanReceived { pending });
                }
                CompletionOutcome::Failed(message) => inner.fail(&message),
                other => {
                    log::warn!("Unexpected completion response to a message: {:?}", other);
                    inner.fail(SEND_FAILED);
                }
            },
            Err(ConsoleError::Api(message)) => inner.fail(&message),
            Err(e) => {
                log::error!("Failed to send message: {}", e);
                inner.fail(SEND_FAILED);
            }
        }
    }

    /// Approve the pending plan. The result arrives over the realtime channel.
    pub async fn approve_plan(&self) {
        let inner = &self.inner;
        if inner.state.borrow().pending_plan().is_none() {
            return;
        }
        let Some(credential) = inner.credentials.credential() else {
            inner.fail(AUTH_ERROR);
            return;
        };

        let (token, pending) = {
            let mut st = inner.state.borrow_mut();
            let pending = match std::mem::replace(&mut st.phase, Phase::Idle) {
                Phase::AwaitingApproval(p) => p,
                other => {
                    st.phase = other;
                    return;
                }
            };
            st.error = None;
            let token = st.next_approval();
            st.phase = Phase::Processing(Approval {
                token,
                plan: pending.clone(),
                timer: None,
            });
            (token, pending)
        };
        inner.event_bus.emit(ChatEvent::ProcessingStarted {
            session_id: pending.session_id.clone(),
        });

        let req = CompletionRequest::approval(&pending, inner.refresh_conversation_id());
        match inner.completion.complete(req, &credential).await {
            Ok(response) => match response.into_outcome() {
                CompletionOutcome::Processing => inner.arm_timeout(token),
                CompletionOutcome::Failed(message) => {
                    inner.resolve(Trigger::Approval(token), Outcome::Failed(message))
                }
                other => {
                    // No explicit status; still bound the wait
                    log::warn!("Unexpected approval response: {:?}", other);
                    inner.arm_timeout(token);
                }
            },
            Err(ConsoleError::Api(message)) => {
                inner.resolve(Trigger::Approval(token), Outcome::Failed(message))
            }
            Err(e) => {
                log::error!("Failed to approve plan: {}", e);
                inner.resolve(Trigger::Approval(token), Outcome::Failed(APPROVE_FAILED.to_string()));
            }
        }
    }

    /// Drop the pending plan, recording the user's feedback in the history.
    /// Purely local: the backend is not told.
    pub fn reject_plan(&self, feedback: Option<&str>) {
        let inner = &self.inner;
        let feedback = feedback
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_REJECTION)
            .to_string();

        let entry = {
            let mut st = inner.state.borrow_mut();
            if st.pending_plan().is_none() {
                return;
            }
            st.phase = Phase::Idle;
            st.error = None;
            let entry = ChatEntry::user(feedback.clone());
            st.history.push(entry.clone());
            entry
        };
        inner.event_bus.emit(ChatEvent::HistoryAppended { entry });
        inner.event_bus.emit(ChatEvent::PlanRejected { feedback });
        inner.checkpoint();
    }

    /// Start a new conversation: forget history, identities and any open cycle.
    pub fn reset(&self) {
        let inner = &self.inner;
        let (timer, session_id) = {
            let mut st = inner.state.borrow_mut();
            let timer = st.abandon();
            // In-flight message responses belong to the old conversation
            st.next_request();
            let session_id = st.session_id.take();
            st.conversation_id = None;
            st.history.clear();
            st.error = None;
            (timer, session_id)
        };
        if let Some(handle) = timer {
            inner.timer.cancel(handle);
        }
        if let Some(session_id) = session_id {
            if let Err(e) = inner.realtime.leave(session_id.as_str()) {
                log::warn!("Failed to leave room {}: {}", session_id, e);
            }
        }
        if let Err(e) = inner.store.clear() {
            inner.persist_failed(e);
        }
        inner.event_bus.emit(ChatEvent::Reset);
    }
}

impl Drop for ChatCoordinator {
    fn drop(&mut self) {
        self.inner.realtime.off(self.listener);
        if let Some(handle) = self.inner.state.borrow_mut().abandon() {
            self.inner.timer.cancel(handle);
        }
    }
}

impl Inner {
    fn rejoin_rooms(&self) {
        let user_room = self.credentials.credential().and_then(|c| c.user_id);
        let session_room = self.state.borrow().session_id.clone();
        let rooms = user_room
            .into_iter()
            .chain(session_room.map(|s| s.0));
        for room in rooms {
            if let Err(e) = self.realtime.join(&room) {
                log::warn!("Failed to join room {}: {}", room, e);
            }
        }
    }

    /// Adopt the stored conversation id so later checkpoints do not write
    /// an older value back over it
    fn refresh_conversation_id(&self) -> Option<ConversationId> {
        let stored = self.store.conversation_id();
        self.state.borrow_mut().conversation_id = stored.clone();
        stored
    }

    fn switch_room(&self, previous: Option<&SessionId>, next: &SessionId) {
        if let Some(previous) = previous.filter(|p| *p != next) {
            if let Err(e) = self.realtime.leave(previous.as_str()) {
                log::warn!("Failed to leave room {}: {}", previous, e);
            }
        }
        if let Err(e) = self.realtime.join(next.as_str()) {
            log::warn!("Failed to join room {}: {}", next, e);
        }
    }

    fn on_plan_result(&self, result: &PlanResultEvent) {
        let current = self.state.borrow().session_id.clone();
        if current.as_ref() != Some(&result.session_id) {
            log::debug!(
                "Ignoring plan result for session {} (current: {:?})",
                result.session_id,
                current.as_ref().map(SessionId::as_str),
            );
            self.event_bus.emit(ChatEvent::StaleEventDropped {
                session_id: result.session_id.clone(),
            });
            return;
        }
        let outcome = match result.kind() {
            ResultKind::Failed(message) => Outcome::Failed(message),
            ResultKind::Completed(payload) => Outcome::Completed(payload),
            ResultKind::Empty => Outcome::Empty,
        };
        self.resolve(Trigger::Realtime, outcome);
    }

    fn arm_timeout(self: &Rc<Self>, token: u64) {
        // The realtime result may have beaten the HTTP response
        if !self.state.borrow().is_processing_approval(token) {
            return;
        }
        let weak = Rc::downgrade(self);
        let handle = self.timer.schedule(
            self.approval_timeout_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.resolve(Trigger::Approval(token), Outcome::TimedOut);
                }
            }),
        );
        if let Phase::Processing(approval) = &mut self.state.borrow_mut().phase {
            approval.timer = Some(handle);
        }
    }

    fn resolve(&self, trigger: Trigger, outcome: Outcome) {
        let resolution = self.state.borrow_mut().resolve(trigger, outcome);
        let Some(Resolution { session_id, timer, entry, error, timed_out }) = resolution else {
            log::debug!("Plan cycle already resolved ({:?})", trigger);
            return;
        };
        if let Some(handle) = timer {
            self.timer.cancel(handle);
        }
        let success = error.is_none();
        if let Some(entry) = entry {
            self.event_bus.emit(ChatEvent::HistoryAppended { entry });
        }
        if timed_out {
            log::warn!("No plan result for session {} before the timeout", session_id);
            self.event_bus.emit(ChatEvent::TimedOut { session_id: session_id.clone() });
        }
        if let Some(message) = error {
            self.event_bus.emit(ChatEvent::Error { message });
        }
        self.event_bus.emit(ChatEvent::Resolved { session_id, success });
        self.checkpoint();
    }

    /// Set a user-facing error and close any open cycle
    fn fail(&self, message: &str) {
        let timer = {
            let mut st = self.state.borrow_mut();
            st.error = Some(message.to_string());
            st.abandon()
        };
        if let Some(handle) = timer {
            self.timer.cancel(handle);
        }
        self.event_bus.emit(ChatEvent::Error {
            message: message.to_string(),
        });
    }

    fn checkpoint(&self) {
        let snapshot = self.state.borrow().snapshot();
        if let Err(e) = self.store.save(&snapshot) {
            self.persist_failed(e);
        }
    }

    fn persist_failed(&self, e: ConsoleError) {
        log::warn!("Failed to persist chat state: {}", e);
        self.event_bus.emit(ChatEvent::PersistFailed {
            message: e.to_string(),
        });
    }
}
