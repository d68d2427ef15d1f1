//! In-memory backend for local and demo use.
//!
//! Plays both server roles: it answers completion requests with canned plans
//! and, once a plan is approved, pushes a `chat:plan:result` into the
//! session's room after `result_delay_ms`. Results only reach the client if
//! the channel is connected and the room is joined, as with the real server.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use console_core::listeners::ListenerRegistry;
use console_core::ports::*;
use console_types::{
    Result,
    config::DemoConfig,
    plan::{ConversationId, Plan, SessionId},
    realtime::{PlanResultEvent, RealtimeEvent, RealtimeEventKind},
    wire::{CompletionRequest, CompletionResponse},
};

pub struct DemoBackend {
    shared: Rc<Shared>,
}

struct Shared {
    timer: Rc<dyn TimerPort>,
    result_delay_ms: u64,
    connected: Cell<bool>,
    rooms: RefCell<BTreeSet<String>>,
    listeners: ListenerRegistry,
    /// Query behind each plan still awaiting approval
    sessions: RefCell<HashMap<SessionId, String>>,
    next_conversation: Cell<i64>,
}

impl DemoBackend {
    pub fn new(config: &DemoConfig, timer: Rc<dyn TimerPort>) -> Self {
        Self {
            shared: Rc::new(Shared {
                timer,
                result_delay_ms: config.result_delay_ms,
                connected: Cell::new(false),
                rooms: RefCell::new(BTreeSet::new()),
                listeners: ListenerRegistry::new(),
                sessions: RefCell::new(HashMap::new()),
                next_conversation: Cell::new(1),
            }),
        }
    }

    /// Plans proposed but not yet approved
    pub fn open_sessions(&self) -> usize {
        self.shared.sessions.borrow().len()
    }

    pub fn rooms(&self) -> Vec<String> {
        self.shared.rooms.borrow().iter().cloned().collect()
    }

    /// Push a plan result as if the server had finished executing
    pub fn publish(&self, event: PlanResultEvent) -> bool {
        self.shared.publish(event)
    }

    fn propose(&self, req: &CompletionRequest) -> CompletionResponse {
        let query = req
            .messages
            .last()
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        let session_id = SessionId(Uuid::new_v4().to_string());
        let conversation_id = req.conversation_id.clone().unwrap_or_else(|| {
            let id = self.shared.next_conversation.get();
            self.shared.next_conversation.set(id + 1);
            ConversationId::Number(id)
        });

        let plan = Plan::from(json!({
            "description": format!("Plan for: {}", query),
            "steps": [
                { "id": 1, "action": "analyze", "detail": format!("Understand \"{}\"", query) },
                { "id": 2, "action": "execute", "detail": "Run the required tools" },
                { "id": 3, "action": "report", "detail": "Summarise the outcome" },
            ],
        }));
        self.shared
            .sessions
            .borrow_mut()
            .insert(session_id.clone(), query);
        log::info!("Demo backend proposed a plan for session {}", session_id);
        CompletionResponse::plan(plan, session_id, Some(conversation_id))
    }

    fn accept(&self, req: &CompletionRequest) -> CompletionResponse {
        let Some(session_id) = req.session_id.clone() else {
            return CompletionResponse::error("Session id is required for approval");
        };
        // One approval per plan, as on the real backend
        let query = self.shared.sessions.borrow_mut().remove(&session_id);
        let Some(query) = query else {
            return CompletionResponse::error(format!("Unknown session {}", session_id));
        };

        let weak = Rc::downgrade(&self.shared);
        self.shared.timer.schedule(
            self.shared.result_delay_ms,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    let result = json!({
                        "text": format!("Finished: {}", query),
                        "steps": 3,
                    });
                    shared.publish(PlanResultEvent::completed(session_id, result));
                }
            }),
        );
        CompletionResponse::processing()
    }
}

impl Shared {
    fn publish(&self, event: PlanResultEvent) -> bool {
        let room = event.session_id.as_str();
        if !self.connected.get() || !self.rooms.borrow().contains(room) {
            log::debug!("Demo result for {} not delivered: room not joined", room);
            return false;
        }
        self.listeners.dispatch(&RealtimeEvent::PlanResult(event)) > 0
    }
}

#[async_trait(?Send)]
impl CompletionPort for DemoBackend {
    async fn complete(
        &self,
        req: CompletionRequest,
        _credential: &Credential,
    ) -> Result<CompletionResponse> {
        if req.is_approval {
            Ok(self.accept(&req))
        } else {
            Ok(self.propose(&req))
        }
    }
}

impl RealtimePort for DemoBackend {
    fn connect(&self) -> Result<()> {
        if !self.shared.connected.replace(true) {
            self.shared.listeners.dispatch(&RealtimeEvent::Connected);
        }
        Ok(())
    }

    fn disconnect(&self) {
        if self.shared.connected.replace(false) {
            self.shared.listeners.dispatch(&RealtimeEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.get()
    }

    fn join(&self, room: &str) -> Result<()> {
        self.shared.rooms.borrow_mut().insert(room.to_string());
        Ok(())
    }

    fn leave(&self, room: &str) -> Result<()> {
        self.shared.rooms.borrow_mut().remove(room);
        Ok(())
    }

    fn on(&self, kind: RealtimeEventKind, handler: RealtimeHandler) -> ListenerId {
        self.shared.listeners.add(kind, handler)
    }

    fn off(&self, id: ListenerId) {
        self.shared.listeners.remove(id);
    }
}
