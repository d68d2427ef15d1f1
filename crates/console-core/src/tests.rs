#[cfg(test)]
mod tests {
    use crate::coordinator::*;
    use crate::event_bus::EventBus;
    use crate::listeners::ListenerRegistry;
    use crate::ports::*;
    use crate::state::{Approval, ChatState, Outcome, Phase, Trigger};
    use crate::store::ChatStore;
    use crate::timer::ManualTimer;
    use console_types::config::{ConsoleConfig, StorageKeys};
    use console_types::event::ChatEvent;
    use console_types::message::*;
    use console_types::plan::*;
    use console_types::realtime::*;
    use console_types::wire::*;
    use console_types::{ConsoleError, Result};

    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    use async_trait::async_trait;
    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use serde_json::json;

    // ─── Mock Ports ──────────────────────────────────────────

    enum Reply {
        Ready(Result<CompletionResponse>),
        Gated(oneshot::Receiver<Result<CompletionResponse>>),
    }

    #[derive(Default)]
    struct MockCompletion {
        replies: RefCell<VecDeque<Reply>>,
        requests: RefCell<Vec<CompletionRequest>>,
    }

    impl MockCompletion {
        fn reply(&self, response: CompletionResponse) {
            self.replies.borrow_mut().push_back(Reply::Ready(Ok(response)));
        }

        fn fail(&self, error: ConsoleError) {
            self.replies.borrow_mut().push_back(Reply::Ready(Err(error)));
        }

        fn gate(&self) -> oneshot::Sender<Result<CompletionResponse>> {
            let (tx, rx) = oneshot::channel();
            self.replies.borrow_mut().push_back(Reply::Gated(rx));
            tx
        }

        fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.borrow().last().cloned().expect("no request sent")
        }
    }

    #[async_trait(?Send)]
    impl CompletionPort for MockCompletion {
        async fn complete(
            &self,
            req: CompletionRequest,
            _credential: &Credential,
        ) -> Result<CompletionResponse> {
            self.requests.borrow_mut().push(req);
            let reply = self.replies.borrow_mut().pop_front();
            match reply {
                Some(Reply::Ready(result)) => result,
                Some(Reply::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(ConsoleError::Network("gate dropped".to_string()))),
                None => Err(ConsoleError::Network("no scripted reply".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct MockRealtime {
        listeners: ListenerRegistry,
        joined: RefCell<Vec<String>>,
        left: RefCell<Vec<String>>,
    }

    impl MockRealtime {
        fn emit(&self, event: PlanResultEvent) {
            self.listeners.dispatch(&RealtimeEvent::PlanResult(event));
        }
    }

    impl RealtimePort for MockRealtime {
        fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn disconnect(&self) {}

        fn is_connected(&self) -> bool {
            true
        }

        fn join(&self, room: &str) -> Result<()> {
            self.joined.borrow_mut().push(room.to_string());
            Ok(())
        }

        fn leave(&self, room: &str) -> Result<()> {
            self.left.borrow_mut().push(room.to_string());
            Ok(())
        }

        fn on(&self, kind: RealtimeEventKind, handler: RealtimeHandler) -> ListenerId {
            self.listeners.add(kind, handler)
        }

        fn off(&self, id: ListenerId) {
            self.listeners.remove(id);
        }
    }

    #[derive(Default)]
    struct MapStorage {
        data: RefCell<HashMap<String, String>>,
        fail_writes: Cell<bool>,
    }

    impl StoragePort for MapStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.data.borrow().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.get() {
                return Err(ConsoleError::Storage("quota exceeded".to_string()));
            }
            self.data.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.data.borrow_mut().remove(key);
            Ok(())
        }

        fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .data
                .borrow()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        fn backend_name(&self) -> &str {
            "map"
        }
    }

    struct MockCredentials {
        credential: RefCell<Option<Credential>>,
    }

    impl MockCredentials {
        fn signed_in(user_id: Option<&str>) -> Self {
            Self {
                credential: RefCell::new(Some(Credential {
                    token: "token-1".to_string(),
                    user_id: user_id.map(String::from),
                })),
            }
        }

        fn signed_out() -> Self {
            Self {
                credential: RefCell::new(None),
            }
        }
    }

    impl CredentialPort for MockCredentials {
        fn credential(&self) -> Option<Credential> {
            self.credential.borrow().clone()
        }
    }

    // ─── Harness ─────────────────────────────────────────────

    struct Harness {
        coordinator: Rc<ChatCoordinator>,
        completion: Rc<MockCompletion>,
        realtime: Rc<MockRealtime>,
        storage: Rc<MapStorage>,
        credentials: Rc<MockCredentials>,
        timer: Rc<ManualTimer>,
        bus: EventBus,
    }

    fn harness() -> Harness {
        harness_with(Rc::new(MapStorage::default()), MockCredentials::signed_in(None))
    }

    fn harness_with(storage: Rc<MapStorage>, credentials: MockCredentials) -> Harness {
        let completion = Rc::new(MockCompletion::default());
        let realtime = Rc::new(MockRealtime::default());
        let timer = Rc::new(ManualTimer::new());
        let credentials = Rc::new(credentials);
        let bus = EventBus::new();
        let ports = ChatPorts {
            completion: completion.clone(),
            realtime: realtime.clone(),
            storage: storage.clone(),
            credentials: credentials.clone(),
            timer: timer.clone(),
        };
        let coordinator = Rc::new(ChatCoordinator::new(ports, &ConsoleConfig::default(), bus.clone()));
        Harness {
            coordinator,
            completion,
            realtime,
            storage,
            credentials,
            timer,
            bus,
        }
    }

    fn plan_response(session: &str) -> CompletionResponse {
        CompletionResponse::plan(Plan::new("Search flights, then book"), SessionId::from(session), None)
    }

    /// Drive the harness to AwaitingApproval for session `s1`
    fn with_pending_plan() -> Harness {
        let h = harness();
        h.completion.reply(plan_response("s1"));
        block_on(h.coordinator.send_message("book a flight"));
        assert!(h.coordinator.pending_plan().is_some());
        h
    }

    /// Drive the harness to Processing for session `s1`
    fn with_processing() -> Harness {
        let h = with_pending_plan();
        h.completion.reply(CompletionResponse::processing());
        block_on(h.coordinator.approve_plan());
        assert!(h.coordinator.is_processing());
        h
    }

    fn assert_exclusive(c: &ChatCoordinator) {
        assert!(
            !(c.pending_plan().is_some() && c.is_processing()),
            "pending plan and processing both set"
        );
    }

    fn assert_prefix(before: &[ChatEntry], after: &[ChatEntry]) {
        assert!(after.len() >= before.len());
        assert_eq!(&after[..before.len()], before);
    }

    // ─── sendMessage ─────────────────────────────────────────

    #[test]
    fn test_blank_message_is_ignored() {
        let h = harness();
        block_on(h.coordinator.send_message("   \n\t"));
        assert_eq!(h.completion.request_count(), 0);
        assert!(h.coordinator.history().is_empty());
        assert!(h.coordinator.error().is_none());
        assert!(!h.bus.has_pending());
    }

    #[test]
    fn test_send_without_credential_fails_fast() {
        let h = harness_with(Rc::new(MapStorage::default()), MockCredentials::signed_out());
        block_on(h.coordinator.send_message("hello"));

        assert_eq!(h.coordinator.error().as_deref(), Some("User not authenticated."));
        assert!(h.coordinator.history().is_empty());
        assert_eq!(h.completion.request_count(), 0);
    }

    #[test]
    fn test_send_receives_plan() {
        let h = harness();
        h.completion.reply(CompletionResponse::plan(
            Plan::from(json!({"description": "..."})),
            SessionId::from("s1"),
            None,
        ));
        block_on(h.coordinator.send_message("book a flight"));

        let pending = h.coordinator.pending_plan().expect("plan stored");
        assert_eq!(pending.session_id, SessionId::from("s1"));
        assert_eq!(pending.query, "book a flight");
        assert_eq!(pending.plan.description.as_deref(), Some("..."));
        assert_eq!(*h.realtime.joined.borrow(), vec!["s1".to_string()]);

        let history = h.coordinator.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EntryKind::User);
        assert_eq!(history[0].content.as_text(), "book a flight");

        let req = h.completion.last_request();
        assert!(!req.is_approval);
        assert!(req.session_id.is_none());
        assert_eq!(req.messages[0].content, "book a flight");

        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.error().is_none());
    }

    #[test]
    fn test_send_api_error_is_verbatim() {
        let h = harness();
        h.completion.reply(CompletionResponse::error("Model quota exceeded"));
        block_on(h.coordinator.send_message("hello"));

        assert_eq!(h.coordinator.error().as_deref(), Some("Model quota exceeded"));
        assert!(h.coordinator.pending_plan().is_none());
        // The optimistic user turn stays
        assert_eq!(h.coordinator.history().len(), 1);
    }

    #[test]
    fn test_send_transport_error_is_generic() {
        let h = harness();
        h.completion.fail(ConsoleError::Network("connection reset".to_string()));
        block_on(h.coordinator.send_message("hello"));
        assert_eq!(h.coordinator.error().as_deref(), Some(SEND_FAILED));
        assert!(h.coordinator.pending_plan().is_none());
    }

    #[test]
    fn test_send_adapter_api_error_is_verbatim() {
        let h = harness();
        h.completion.fail(ConsoleError::Api("Unauthorized".to_string()));
        block_on(h.coordinator.send_message("hello"));
        assert_eq!(h.coordinator.error().as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_send_unrecognised_response() {
        let h = harness();
        h.completion.reply(CompletionResponse::default());
        block_on(h.coordinator.send_message("hello"));
        assert_eq!(h.coordinator.error().as_deref(), Some(SEND_FAILED));
    }

    #[test]
    fn test_new_request_clears_previous_error() {
        let h = harness();
        h.completion.reply(CompletionResponse::error("first failed"));
        block_on(h.coordinator.send_message("one"));
        assert!(h.coordinator.error().is_some());

        let gate = h.completion.gate();
        let mut pool = LocalPool::new();
        let c = h.coordinator.clone();
        pool.spawner()
            .spawn_local(async move { c.send_message("two").await })
            .unwrap();
        pool.run_until_stalled();
        assert!(h.coordinator.error().is_none());

        gate.send(Ok(plan_response("s2"))).unwrap();
        pool.run_until_stalled();
        assert!(h.coordinator.pending_plan().is_some());
    }

    #[test]
    fn test_conversation_id_read_fresh_from_storage() {
        let h = harness();
        // Another tab moved the conversation on
        h.storage
            .set(&StorageKeys::default().conversation_id, "77")
            .unwrap();
        h.completion.reply(plan_response("s1"));
        block_on(h.coordinator.send_message("hello"));
        assert_eq!(h.completion.last_request().conversation_id, Some(ConversationId::Number(77)));
    }

    #[test]
    fn test_stored_conversation_id_survives_checkpoint() {
        let h = harness();
        h.completion.reply(CompletionResponse::plan(
            Plan::new("p"),
            SessionId::from("s1"),
            Some(ConversationId::Number(1)),
        ));
        block_on(h.coordinator.send_message("one"));

        // Another tab moves the conversation on
        let keys = StorageKeys::default();
        h.storage.set(&keys.conversation_id, "2").unwrap();

        // Response without a conversation id
        h.completion.reply(plan_response("s2"));
        block_on(h.coordinator.send_message("two"));

        assert_eq!(h.completion.last_request().conversation_id, Some(ConversationId::Number(2)));
        assert_eq!(h.storage.get(&keys.conversation_id).unwrap().as_deref(), Some("2"));
        assert_eq!(h.coordinator.view().conversation_id, Some(ConversationId::Number(2)));
    }

    #[test]
    fn test_conversation_id_from_response_is_persisted() {
        let h = harness();
        h.completion.reply(CompletionResponse::plan(
            Plan::new("p"),
            SessionId::from("s1"),
            Some(ConversationId::Text("conv-1".to_string())),
        ));
        block_on(h.coordinator.send_message("hello"));

        assert_eq!(
            h.coordinator.view().conversation_id,
            Some(ConversationId::Text("conv-1".to_string()))
        );
        let keys = StorageKeys::default();
        assert_eq!(h.storage.get(&keys.conversation_id).unwrap().as_deref(), Some(r#""conv-1""#));
        assert_eq!(h.storage.get(&keys.session_id).unwrap().as_deref(), Some("s1"));

        // Next turn carries it
        h.completion.reply(plan_response("s2"));
        block_on(h.coordinator.send_message("again"));
        assert_eq!(
            h.completion.last_request().conversation_id,
            Some(ConversationId::Text("conv-1".to_string()))
        );
    }

    #[test]
    fn test_new_plan_switches_rooms() {
        let h = with_pending_plan();
        h.completion.reply(plan_response("s2"));
        block_on(h.coordinator.send_message("something else"));

        assert_eq!(h.coordinator.pending_plan().unwrap().session_id, SessionId::from("s2"));
        assert_eq!(*h.realtime.left.borrow(), vec!["s1".to_string()]);
        assert_eq!(h.realtime.joined.borrow().last().map(String::as_str), Some("s2"));
    }

    #[test]
    fn test_superseded_response_is_discarded() {
        let h = harness();
        let first = h.completion.gate();
        h.completion.reply(plan_response("s2"));

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let c1 = h.coordinator.clone();
        spawner
            .spawn_local(async move { c1.send_message("first").await })
            .unwrap();
        pool.run_until_stalled();

        let c2 = h.coordinator.clone();
        spawner
            .spawn_local(async move { c2.send_message("second").await })
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(h.coordinator.pending_plan().unwrap().session_id, SessionId::from("s2"));

        // The first request answers late
        first.send(Ok(plan_response("s1"))).unwrap();
        pool.run_until_stalled();

        let pending = h.coordinator.pending_plan().unwrap();
        assert_eq!(pending.session_id, SessionId::from("s2"));
        assert_eq!(pending.query, "second");
        assert_eq!(h.coordinator.session_id(), Some(SessionId::from("s2")));
        assert_eq!(h.coordinator.history().len(), 2);
    }

    #[test]
    fn test_message_while_processing_abandons_cycle() {
        let h = with_processing();
        assert_eq!(h.timer.pending(), 1);

        h.completion.reply(plan_response("s2"));
        block_on(h.coordinator.send_message("never mind"));

        assert!(!h.coordinator.is_processing());
        assert_eq!(h.timer.pending(), 0);
        assert_exclusive(&h.coordinator);

        // The abandoned session's result is stale now
        let before = h.coordinator.history();
        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "late"})));
        assert_eq!(h.coordinator.history(), before);
        assert!(h.coordinator.pending_plan().is_some());
    }

    // ─── approvePlan ─────────────────────────────────────────

    #[test]
    fn test_approve_without_plan_is_noop() {
        let h = harness();
        block_on(h.coordinator.approve_plan());
        assert_eq!(h.completion.request_count(), 0);
        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.error().is_none());
    }

    #[test]
    fn test_approve_then_result() {
        let h = with_pending_plan();
        h.completion.reply(CompletionResponse::processing());
        block_on(h.coordinator.approve_plan());

        assert!(h.coordinator.is_processing());
        assert!(h.coordinator.pending_plan().is_none());
        let req = h.completion.last_request();
        assert!(req.is_approval);
        assert_eq!(req.session_id, Some(SessionId::from("s1")));

        h.realtime.emit(PlanResultEvent {
            status: "completed".to_string(),
            session_id: SessionId::from("s1"),
            result: Some(json!({"text": "done"})),
            error: None,
        });

        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.pending_plan().is_none());
        assert!(h.coordinator.error().is_none());
        let history = h.coordinator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, EntryKind::Result);
        assert_eq!(history[1].content, EntryContent::Payload(json!({"text": "done"})));
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_approve_immediate_error() {
        let h = with_pending_plan();
        h.completion.reply(CompletionResponse::error("Session expired"));
        block_on(h.coordinator.approve_plan());

        assert!(!h.coordinator.is_processing());
        assert_eq!(h.coordinator.error().as_deref(), Some("Session expired"));
        assert_eq!(h.timer.pending(), 0);
        assert!(h.coordinator.pending_plan().is_none());
    }

    #[test]
    fn test_approve_transport_error() {
        let h = with_pending_plan();
        h.completion.fail(ConsoleError::Network("offline".to_string()));
        block_on(h.coordinator.approve_plan());

        assert!(!h.coordinator.is_processing());
        assert_eq!(h.coordinator.error().as_deref(), Some(APPROVE_FAILED));
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_approve_without_credential() {
        let h = with_pending_plan();
        // Signed out between plan and approval
        h.credentials.credential.replace(None);
        block_on(h.coordinator.approve_plan());

        assert_eq!(h.completion.request_count(), 1);
        assert_eq!(h.coordinator.error().as_deref(), Some(AUTH_ERROR));
        assert!(h.coordinator.pending_plan().is_none());
        assert!(!h.coordinator.is_processing());
    }

    #[test]
    fn test_timeout_fires() {
        let h = with_processing();
        h.timer.advance(59_999);
        assert!(h.coordinator.is_processing());
        assert!(h.coordinator.error().is_none());

        h.timer.advance(1);
        assert!(!h.coordinator.is_processing());
        assert_eq!(h.coordinator.error().as_deref(), Some(TIMEOUT_ERROR));
        assert!(h.coordinator.pending_plan().is_none());

        let events = h.bus.drain();
        assert!(events.iter().any(|e| matches!(e, ChatEvent::TimedOut { .. })));
    }

    #[test]
    fn test_result_just_before_timeout_wins() {
        let h = with_processing();
        h.timer.advance(59_900);
        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "done"})));

        assert!(!h.coordinator.is_processing());
        assert_eq!(h.timer.pending(), 0);

        h.timer.advance(10_000);
        assert!(h.coordinator.error().is_none());
        assert_eq!(h.coordinator.history().len(), 2);
    }

    #[test]
    fn test_late_result_after_timeout_is_applied() {
        let h = with_processing();
        h.timer.advance(60_000);
        assert_eq!(h.coordinator.error().as_deref(), Some(TIMEOUT_ERROR));
        assert_eq!(h.coordinator.history().len(), 1);

        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "late"})));

        let history = h.coordinator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, EntryContent::Payload(json!({"text": "late"})));
        // The timeout no longer stands once the result is in
        assert!(h.coordinator.error().is_none());
        assert!(!h.coordinator.is_processing());
    }

    #[test]
    fn test_timer_cannot_reopen_resolved_cycle() {
        let mut st = ChatState::restore(Default::default());
        st.session_id = Some(SessionId::from("s1"));
        let token = st.next_approval();
        st.phase = Phase::Processing(Approval {
            token,
            plan: PendingPlan {
                plan: Plan::new("p"),
                session_id: SessionId::from("s1"),
                query: "q".to_string(),
            },
            timer: None,
        });

        assert!(st.resolve(Trigger::Approval(token + 1), Outcome::TimedOut).is_none());
        let failed = st.resolve(Trigger::Realtime, Outcome::Failed("Executor crashed".to_string()));
        assert!(failed.is_some());
        assert!(st.resolve(Trigger::Approval(token), Outcome::TimedOut).is_none());
        assert_eq!(st.error.as_deref(), Some("Executor crashed"));
        assert!(!st.is_processing());
    }

    #[test]
    fn test_result_before_approval_response_skips_timer() {
        let h = with_pending_plan();
        let gate = h.completion.gate();

        let mut pool = LocalPool::new();
        let c = h.coordinator.clone();
        pool.spawner()
            .spawn_local(async move { c.approve_plan().await })
            .unwrap();
        pool.run_until_stalled();
        assert!(h.coordinator.is_processing());

        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "fast"})));
        assert!(!h.coordinator.is_processing());

        gate.send(Ok(CompletionResponse::processing())).unwrap();
        pool.run_until_stalled();

        assert_eq!(h.timer.pending(), 0);
        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.error().is_none());
    }

    #[test]
    fn test_approval_without_status_still_times_out() {
        let h = with_pending_plan();
        h.completion.reply(CompletionResponse::default());
        block_on(h.coordinator.approve_plan());
        assert!(h.coordinator.is_processing());
        assert_eq!(h.timer.pending(), 1);
        h.timer.advance(60_000);
        assert_eq!(h.coordinator.error().as_deref(), Some(TIMEOUT_ERROR));
    }

    // ─── Realtime results ────────────────────────────────────

    #[test]
    fn test_stale_event_is_ignored() {
        let h = with_processing();
        let _ = h.bus.drain();
        let before = h.coordinator.view();

        h.realtime.emit(PlanResultEvent::failed(SessionId::from("other"), "boom"));

        let after = h.coordinator.view();
        assert_eq!(after, before);
        assert!(h.coordinator.is_processing());
        let events = h.bus.drain();
        assert!(matches!(
            events.as_slice(),
            [ChatEvent::StaleEventDropped { session_id }] if session_id.as_str() == "other"
        ));
    }

    #[test]
    fn test_result_error_is_applied() {
        let h = with_processing();
        h.realtime.emit(PlanResultEvent::failed(SessionId::from("s1"), "Executor crashed"));

        assert_eq!(h.coordinator.error().as_deref(), Some("Executor crashed"));
        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.pending_plan().is_none());
        assert_eq!(h.coordinator.history().len(), 1);
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_empty_result_only_clears_plan() {
        let h = with_pending_plan();
        h.realtime.emit(PlanResultEvent {
            status: "cancelled".to_string(),
            session_id: SessionId::from("s1"),
            result: None,
            error: None,
        });
        assert!(h.coordinator.pending_plan().is_none());
        assert!(h.coordinator.error().is_none());
        assert_eq!(h.coordinator.history().len(), 1);
    }

    #[test]
    fn test_result_without_any_session_is_stale() {
        let h = harness();
        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "x"})));
        assert!(h.coordinator.history().is_empty());
    }

    // ─── rejectPlan ──────────────────────────────────────────

    #[test]
    fn test_reject_with_feedback() {
        let h = with_pending_plan();
        let requests = h.completion.request_count();
        h.coordinator.reject_plan(Some("wrong assumption"));

        assert!(h.coordinator.pending_plan().is_none());
        assert!(!h.coordinator.is_processing());
        let history = h.coordinator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, EntryKind::User);
        assert_eq!(history[1].content.as_text(), "wrong assumption");
        assert_eq!(h.completion.request_count(), requests);
    }

    #[test]
    fn test_reject_default_feedback() {
        let h = with_pending_plan();
        h.coordinator.reject_plan(Some("  "));
        assert_eq!(h.coordinator.history()[1].content.as_text(), DEFAULT_REJECTION);
    }

    #[test]
    fn test_reject_twice_is_idempotent() {
        let h = with_pending_plan();
        h.coordinator.reject_plan(None);
        let once = h.coordinator.view();
        let _ = h.bus.drain();

        h.coordinator.reject_plan(None);
        assert_eq!(h.coordinator.view(), once);
        assert!(!h.bus.has_pending());
    }

    #[test]
    fn test_reject_while_processing_is_noop() {
        let h = with_processing();
        h.coordinator.reject_plan(Some("too late"));
        assert!(h.coordinator.is_processing());
        assert_eq!(h.coordinator.history().len(), 1);
    }

    // ─── Invariants ──────────────────────────────────────────

    #[test]
    fn test_exclusion_and_append_only_across_a_session() {
        let h = harness();
        let mut last = h.coordinator.history();
        let mut check = |c: &Rc<ChatCoordinator>| {
            assert_exclusive(c);
            let now = c.history();
            assert_prefix(&last, &now);
            last = now;
        };

        h.completion.reply(plan_response("s1"));
        block_on(h.coordinator.send_message("one"));
        check(&h.coordinator);

        h.completion.reply(CompletionResponse::processing());
        block_on(h.coordinator.approve_plan());
        check(&h.coordinator);

        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "r1"})));
        check(&h.coordinator);

        h.completion.reply(plan_response("s2"));
        block_on(h.coordinator.send_message("two"));
        check(&h.coordinator);

        h.coordinator.reject_plan(Some("nah"));
        check(&h.coordinator);

        h.completion.reply(plan_response("s3"));
        block_on(h.coordinator.send_message("three"));
        h.completion.reply(CompletionResponse::processing());
        block_on(h.coordinator.approve_plan());
        check(&h.coordinator);

        h.timer.advance(60_000);
        check(&h.coordinator);

        let kinds: Vec<EntryKind> = h.coordinator.history().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntryKind::User,
                EntryKind::Result,
                EntryKind::User,
                EntryKind::User,
                EntryKind::User,
            ]
        );
    }

    // ─── Persistence & resume ────────────────────────────────

    #[test]
    fn test_history_persisted_at_checkpoints() {
        let h = with_processing();
        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "done"})));

        let keys = StorageKeys::default();
        let raw = h.storage.get(&keys.history).unwrap().unwrap();
        let stored: Vec<ChatEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, h.coordinator.history());
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_resume_from_storage() {
        let storage = Rc::new(MapStorage::default());
        let keys = StorageKeys::default();
        let history = vec![ChatEntry::user("earlier"), ChatEntry::result(json!({"text": "ok"}))];
        storage.set(&keys.history, &serde_json::to_string(&history).unwrap()).unwrap();
        storage.set(&keys.session_id, "s-old").unwrap();
        storage.set(&keys.conversation_id, "5").unwrap();

        let h = harness_with(storage, MockCredentials::signed_in(Some("u1")));
        let view = h.coordinator.view();
        assert_eq!(view.history, history);
        assert_eq!(view.session_id, Some(SessionId::from("s-old")));
        assert_eq!(view.conversation_id, Some(ConversationId::Number(5)));
        assert!(view.pending_plan.is_none());
        assert_eq!(*h.realtime.joined.borrow(), vec!["u1".to_string(), "s-old".to_string()]);
    }

    #[test]
    fn test_result_after_resume_is_applied() {
        let storage = Rc::new(MapStorage::default());
        let keys = StorageKeys::default();
        storage.set(&keys.session_id, "s-old").unwrap();
        storage
            .set(&keys.history, &serde_json::to_string(&vec![ChatEntry::user("earlier")]).unwrap())
            .unwrap();

        let h = harness_with(storage, MockCredentials::signed_in(None));
        assert_eq!(*h.realtime.joined.borrow(), vec!["s-old".to_string()]);

        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s-old"), json!({"text": "done"})));

        let history = h.coordinator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, EntryKind::Result);
        let raw = h.storage.get(&keys.history).unwrap().unwrap();
        let stored: Vec<ChatEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, history);
        let events = h.bus.drain();
        assert!(events.iter().any(|e| matches!(e, ChatEvent::Resolved { success: true, .. })));
    }

    #[test]
    fn test_error_after_resume_is_applied() {
        let storage = Rc::new(MapStorage::default());
        storage.set(&StorageKeys::default().session_id, "s-old").unwrap();
        let h = harness_with(storage, MockCredentials::signed_in(None));

        h.realtime.emit(PlanResultEvent::failed(SessionId::from("s-old"), "Executor crashed"));
        assert_eq!(h.coordinator.error().as_deref(), Some("Executor crashed"));
        assert!(h.coordinator.history().is_empty());
    }

    #[test]
    fn test_persist_failure_is_reported() {
        let h = harness();
        h.storage.fail_writes.set(true);
        h.completion.reply(plan_response("s1"));
        block_on(h.coordinator.send_message("hello"));

        // The flow carries on regardless
        assert!(h.coordinator.pending_plan().is_some());
        let events = h.bus.drain();
        assert!(events.iter().any(|e| matches!(e, ChatEvent::PersistFailed { .. })));
    }

    #[test]
    fn test_reset_clears_everything() {
        let h = with_processing();
        h.coordinator.reset();

        let view = h.coordinator.view();
        assert!(view.history.is_empty());
        assert!(view.session_id.is_none());
        assert!(view.conversation_id.is_none());
        assert!(!view.processing);
        assert_eq!(h.timer.pending(), 0);
        assert_eq!(*h.realtime.left.borrow(), vec!["s1".to_string()]);
        assert!(h.storage.list_keys("chat").unwrap().is_empty());
    }

    #[test]
    fn test_reset_discards_in_flight_response() {
        let h = harness();
        let gate = h.completion.gate();

        let mut pool = LocalPool::new();
        let c = h.coordinator.clone();
        pool.spawner()
            .spawn_local(async move { c.send_message("first").await })
            .unwrap();
        pool.run_until_stalled();

        h.coordinator.reset();
        gate.send(Ok(plan_response("s1"))).unwrap();
        pool.run_until_stalled();

        let view = h.coordinator.view();
        assert!(view.pending_plan.is_none());
        assert!(view.session_id.is_none());
        assert!(view.history.is_empty());
        assert!(h.realtime.joined.borrow().is_empty());
        assert!(h.storage.get(&StorageKeys::default().session_id).unwrap().is_none());
    }

    #[test]
    fn test_drop_unregisters_listener() {
        let h = harness();
        assert_eq!(h.realtime.listeners.len(), 1);
        let Harness { coordinator, realtime, .. } = h;
        drop(coordinator);
        assert!(realtime.listeners.is_empty());
    }

    // ─── Events ──────────────────────────────────────────────

    #[test]
    fn test_event_sequence_for_full_cycle() {
        let h = with_processing();
        h.realtime.emit(PlanResultEvent::completed(SessionId::from("s1"), json!({"text": "done"})));
        let events = h.bus.drain();

        let names: Vec<&str> = events
            .iter()
            .map(|e| match e {
                ChatEvent::HistoryAppended { .. } => "history",
                ChatEvent::PlanReceived { .. } => "plan",
                ChatEvent::ProcessingStarted { .. } => "processing",
                ChatEvent::Resolved { success: true, .. } => "resolved",
                _ => "other",
            })
            .collect();
        assert_eq!(names, vec!["history", "plan", "processing", "history", "resolved"]);
    }

    // ─── EventBus Tests ──────────────────────────────────────

    #[test]
    fn test_event_bus_clone_shares_state() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();
        bus1.emit(ChatEvent::Reset);
        assert!(bus2.has_pending());
        assert_eq!(bus2.drain().len(), 1);
        assert!(!bus1.has_pending());
    }

    #[test]
    fn test_event_bus_pending_errors_do_not_drain() {
        let h = harness_with(Rc::new(MapStorage::default()), MockCredentials::signed_out());
        block_on(h.coordinator.send_message("hello"));

        assert_eq!(h.bus.pending_errors(), vec![AUTH_ERROR.to_string()]);
        assert!(h.bus.has_pending());
        assert_eq!(h.bus.drain().len(), 1);
        assert!(h.bus.pending_errors().is_empty());
    }

    // ─── ListenerRegistry Tests ──────────────────────────────

    #[test]
    fn test_registry_dispatches_by_kind() {
        let registry = ListenerRegistry::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        registry.add(
            RealtimeEventKind::Connected,
            Box::new(move |_: &RealtimeEvent| h.set(h.get() + 1)),
        );

        assert_eq!(registry.dispatch(&RealtimeEvent::Connected), 1);
        let ev = RealtimeEvent::Disconnected { reason: "bye".to_string() };
        assert_eq!(registry.dispatch(&ev), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_registry_remove() {
        let registry = ListenerRegistry::new();
        let id = registry.add(RealtimeEventKind::Connected, Box::new(|_: &RealtimeEvent| {}));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.dispatch(&RealtimeEvent::Connected), 0);
    }

    #[test]
    fn test_registry_handler_may_unsubscribe_itself() {
        let registry = Rc::new(ListenerRegistry::new());
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let (r, s) = (Rc::downgrade(&registry), slot.clone());
        let id = registry.add(
            RealtimeEventKind::Connected,
            Box::new(move |_: &RealtimeEvent| {
                if let (Some(r), Some(id)) = (r.upgrade(), s.get()) {
                    r.remove(id);
                }
            }),
        );
        slot.set(Some(id));

        assert_eq!(registry.dispatch(&RealtimeEvent::Connected), 1);
        assert!(registry.is_empty());
    }

    // ─── ManualTimer Tests ───────────────────────────────────

    #[test]
    fn test_manual_timer_fires_in_order() {
        let timer = ManualTimer::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, name) in [(30, "b"), (10, "a"), (50, "c")] {
            let log = log.clone();
            timer.schedule(delay, Box::new(move || log.borrow_mut().push(name)));
        }
        timer.advance(40);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(timer.now_ms(), 40);
        timer.advance(10);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_manual_timer_cancel() {
        let timer = ManualTimer::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let handle = timer.schedule(5, Box::new(move || f.set(true)));
        timer.cancel(handle);
        timer.advance(100);
        assert!(!fired.get());
        // Cancelling again is harmless
        timer.cancel(handle);
    }

    // ─── ChatStore Tests ─────────────────────────────────────

    #[test]
    fn test_store_tolerates_corrupt_history() {
        let storage = Rc::new(MapStorage::default());
        let keys = StorageKeys::default();
        storage.set(&keys.history, "{not json").unwrap();
        storage.set(&keys.conversation_id, "conv-abc").unwrap();

        let store = ChatStore::new(storage, keys);
        let snapshot = store.load();
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.conversation_id, Some(ConversationId::Text("conv-abc".to_string())));
        assert!(snapshot.session_id.is_none());
    }

    #[test]
    fn test_store_save_removes_cleared_ids() {
        let storage = Rc::new(MapStorage::default());
        let keys = StorageKeys::default();
        storage.set(&keys.session_id, "s1").unwrap();

        let store = ChatStore::new(storage.clone(), keys.clone());
        store.save(&Default::default()).unwrap();
        assert!(storage.get(&keys.session_id).unwrap().is_none());
        assert_eq!(storage.get(&keys.history).unwrap().as_deref(), Some("[]"));
    }
}
