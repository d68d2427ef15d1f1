//! Listener bookkeeping shared by realtime channel implementations.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use console_types::realtime::{RealtimeEvent, RealtimeEventKind};

use crate::ports::{ListenerId, RealtimeHandler};

struct Listener {
    id: ListenerId,
    kind: RealtimeEventKind,
    handler: Rc<dyn Fn(&RealtimeEvent)>,
}

/// Typed listener table. Handlers may add or remove listeners while being
/// dispatched to; removal takes effect from the next dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, kind: RealtimeEventKind, handler: RealtimeHandler) -> ListenerId {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.listeners.borrow_mut().push(Listener {
            id,
            kind,
            handler: Rc::from(handler),
        });
        id
    }

    /// Returns false if the id was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener of its kind. Returns how many ran.
    pub fn dispatch(&self, event: &RealtimeEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Rc<dyn Fn(&RealtimeEvent)>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.handler.clone())
            .collect();
        for handler in &targets {
            handler(event);
        }
        targets.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}
