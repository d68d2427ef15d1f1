//! Outbox of `ChatEvent`s between the coordinator and whatever renders it.
//!
//! The coordinator emits from async tasks, realtime listeners and timer
//! callbacks; the host drains once per frame or after each JS call. Every
//! emit happens after the coordinator's state borrow is released, so a
//! drained event never describes a state the view has not reached yet.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use console_types::event::ChatEvent;

/// Clones share one queue.
#[derive(Clone, Default)]
pub struct EventBus {
    queue: Rc<RefCell<VecDeque<ChatEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ChatEvent) {
        log::trace!("chat event: {:?}", event);
        self.queue.borrow_mut().push_back(event);
    }

    /// Take everything emitted since the last drain, oldest first.
    pub fn drain(&self) -> Vec<ChatEvent> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Errors still waiting to be drained, oldest first
    pub fn pending_errors(&self) -> Vec<String> {
        self.queue
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}
