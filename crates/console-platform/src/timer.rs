//! `setTimeout`-backed timers via gloo-timers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use gloo_timers::callback::Timeout;

use console_core::ports::{TimerHandle, TimerPort};

#[derive(Default)]
pub struct GlooTimer {
    next_id: Cell<u64>,
    active: Rc<RefCell<HashMap<u64, Timeout>>>,
}

impl GlooTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.borrow().len()
    }
}

impl TimerPort for GlooTimer {
    fn schedule(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        let active = Rc::downgrade(&self.active);
        let delay = u32::try_from(delay_ms).unwrap_or(u32::MAX);
        let timeout = Timeout::new(delay, move || {
            if let Some(active) = active.upgrade() {
                let spent = active.borrow_mut().remove(&id);
                // A Timeout must not be dropped inside its own callback
                if let Some(spent) = spent {
                    wasm_bindgen_futures::spawn_local(async move { drop(spent) });
                }
            }
            callback();
        });
        self.active.borrow_mut().insert(id, timeout);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        // Dropping a gloo Timeout clears it
        let timeout = self.active.borrow_mut().remove(&handle.0);
        drop(timeout);
    }
}
