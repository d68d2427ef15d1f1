//! Chat persistence on top of StoragePort.
//!
//! Layout (key names come from `StorageKeys`):
//!   session id      → raw string
//!   conversation id → JSON scalar, so numbers stay numbers
//!   history         → JSON array of `ChatEntry`
//!
//! Reads are lenient: a corrupt value is logged and treated as absent, so a
//! bad write from an older build never blocks the chat from loading.

use std::rc::Rc;

use console_types::{
    Result,
    config::StorageKeys,
    message::ChatEntry,
    plan::{ConversationId, SessionId},
    session::ChatSnapshot,
};

use crate::ports::StoragePort;

pub struct ChatStore {
    storage: Rc<dyn StoragePort>,
    keys: StorageKeys,
}

impl ChatStore {
    pub fn new(storage: Rc<dyn StoragePort>, keys: StorageKeys) -> Self {
        Self { storage, keys }
    }

    pub fn load(&self) -> ChatSnapshot {
        ChatSnapshot {
            session_id: self.session_id(),
            conversation_id: self.conversation_id(),
            history: self.history(),
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.read(&self.keys.session_id)
            .filter(|s| !s.is_empty())
            .map(SessionId)
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        let raw = self.read(&self.keys.conversation_id)?;
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str::<ConversationId>(&raw) {
            Ok(id) => Some(id),
            // Written unquoted by something else; keep it as text
            Err(_) => Some(ConversationId::Text(raw)),
        }
    }

    pub fn history(&self) -> Vec<ChatEntry> {
        let Some(raw) = self.read(&self.keys.history) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Discarding unreadable chat history: {}", e);
                Vec::new()
            }
        }
    }

    /// Write every persisted field; `None` removes the key.
    pub fn save(&self, snapshot: &ChatSnapshot) -> Result<()> {
        match &snapshot.session_id {
            Some(id) => self.storage.set(&self.keys.session_id, id.as_str())?,
            None => self.storage.delete(&self.keys.session_id)?,
        }
        match &snapshot.conversation_id {
            Some(id) => self
                .storage
                .set(&self.keys.conversation_id, &serde_json::to_string(id)?)?,
            None => self.storage.delete(&self.keys.conversation_id)?,
        }
        let history = serde_json::to_string(&snapshot.history)?;
        self.storage.set(&self.keys.history, &history)
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.delete(&self.keys.session_id)?;
        self.storage.delete(&self.keys.conversation_id)?;
        self.storage.delete(&self.keys.history)
    }

    pub fn backend_name(&self) -> &str {
        self.storage.backend_name()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to read {} from {}: {}", key, self.storage.backend_name(), e);
                None
            }
        }
    }
}
