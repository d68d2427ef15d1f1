//! Port traits: the hexagonal architecture boundary.
//!
//! These traits are defined here in `console-core` (pure Rust).
//! Implementations live in `console-platform` (browser adapters).
//! The coordinator never imports platform code; it only depends on these traits.

use async_trait::async_trait;
use console_types::{
    Result,
    realtime::{RealtimeEvent, RealtimeEventKind},
    wire::{CompletionRequest, CompletionResponse},
};

// ─── Completion Port ─────────────────────────────────────────

/// Client of `POST /chat/completion`.
///
/// An `{ error }` body from the backend is a successful call returning a
/// response with `error` set. `Err` is reserved for transport failures,
/// except `ConsoleError::Api`, which adapters use when the backend's error
/// text is known but the body could not be decoded as a response.
#[async_trait(?Send)]
pub trait CompletionPort {
    async fn complete(
        &self,
        req: CompletionRequest,
        credential: &Credential,
    ) -> Result<CompletionResponse>;
}

// ─── Realtime Port ───────────────────────────────────────────

pub type RealtimeHandler = Box<dyn Fn(&RealtimeEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Persistent event channel with room membership.
///
/// The owner of the channel drives `connect`/`disconnect`; consumers only
/// register listeners and join rooms. Joins made while disconnected are
/// remembered and sent once the channel opens.
pub trait RealtimePort {
    fn connect(&self) -> Result<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Join a room (a session id or a user id)
    fn join(&self, room: &str) -> Result<()>;

    fn leave(&self, room: &str) -> Result<()>;

    /// Register a handler for one event kind
    fn on(&self, kind: RealtimeEventKind, handler: RealtimeHandler) -> ListenerId;

    fn off(&self, id: ListenerId);
}

// ─── Storage Port ────────────────────────────────────────────

/// String key-value persistence (localStorage semantics: synchronous).
pub trait StoragePort {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// List keys with a given prefix
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Name of this backend (for logging/debug)
    fn backend_name(&self) -> &str;
}

// ─── Timer Port ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// One-shot timers. Callbacks never run synchronously inside `schedule`.
pub trait TimerPort {
    fn schedule(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle;

    /// Cancelling a fired or unknown handle is a no-op
    fn cancel(&self, handle: TimerHandle);
}

// ─── Credential Port ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    /// Room for user-wide realtime events
    pub user_id: Option<String>,
}

pub trait CredentialPort {
    /// `None` when the user is not signed in
    fn credential(&self) -> Option<Credential>;
}
