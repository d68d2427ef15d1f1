//! Virtual clock for driving timeouts deterministically.

use std::cell::{Cell, RefCell};

use crate::ports::{TimerHandle, TimerPort};

struct Scheduled {
    handle: TimerHandle,
    due_ms: u64,
    callback: Box<dyn FnOnce()>,
}

/// A `TimerPort` whose time only moves when `advance` is called.
#[derive(Default)]
pub struct ManualTimer {
    now_ms: Cell<u64>,
    next_id: Cell<u64>,
    scheduled: RefCell<Vec<Scheduled>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    pub fn pending(&self) -> usize {
        self.scheduled.borrow().len()
    }

    /// Move time forward, firing due callbacks in order of their due time.
    /// Callbacks may schedule or cancel other timers.
    pub fn advance(&self, ms: u64) {
        let target = self.now_ms.get() + ms;
        loop {
            let next = {
                let mut scheduled = self.scheduled.borrow_mut();
                let earliest = scheduled
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.due_ms <= target)
                    .min_by_key(|(_, s)| (s.due_ms, s.handle.0))
                    .map(|(i, _)| i);
                earliest.map(|i| scheduled.remove(i))
            };
            let Some(timer) = next else { break };
            self.now_ms.set(timer.due_ms);
            (timer.callback)();
        }
        self.now_ms.set(target);
    }
}

impl TimerPort for ManualTimer {
    fn schedule(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle(self.next_id.get() + 1);
        self.next_id.set(handle.0);
        self.scheduled.borrow_mut().push(Scheduled {
            handle,
            due_ms: self.now_ms.get() + delay_ms,
            callback,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.scheduled.borrow_mut().retain(|s| s.handle != handle);
    }
}
