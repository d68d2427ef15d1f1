//! Realtime channel over a browser WebSocket.
//!
//! Frames are JSON text (`{ event, data }`, see `console_types::realtime`).
//! Room membership is remembered locally: joins made before the socket is
//! open are sent on open, and every remembered room is re-joined after a
//! reconnect, since the server forgets a connection's rooms when it drops.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use console_core::listeners::ListenerRegistry;
use console_core::ports::{ListenerId, RealtimeHandler, RealtimePort};
use console_types::{
    ConsoleError, Result,
    realtime::{ClientFrame, RealtimeEvent, RealtimeEventKind, ServerFrame},
};

pub struct WebSocketChannel {
    shared: Rc<Shared>,
}

struct Shared {
    url: String,
    socket: RefCell<Option<WebSocket>>,
    handlers: RefCell<Option<SocketHandlers>>,
    rooms: RefCell<BTreeSet<String>>,
    listeners: ListenerRegistry,
}

/// Closures owned for as long as their socket is live
struct SocketHandlers {
    _onopen: Closure<dyn FnMut()>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            shared: Rc::new(Shared {
                url: url.into(),
                socket: RefCell::new(None),
                handlers: RefCell::new(None),
                rooms: RefCell::new(BTreeSet::new()),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Rooms that will be (re-)joined whenever the socket opens
    pub fn rooms(&self) -> Vec<String> {
        self.shared.rooms.borrow().iter().cloned().collect()
    }
}

impl Shared {
    fn send(&self, frame: &ClientFrame) -> Result<()> {
        let socket = self.socket.borrow();
        let Some(socket) = socket.as_ref().filter(|s| s.ready_state() == WebSocket::OPEN) else {
            // Joins go out from on_open
            return Ok(());
        };
        let text = frame.encode()?;
        log::debug!("realtime → {}", text);
        socket
            .send_with_str(&text)
            .map_err(|e| ConsoleError::Realtime(format!("send failed: {:?}", e)))
    }

    fn on_open(&self) {
        let rooms: Vec<String> = self.rooms.borrow().iter().cloned().collect();
        log::info!("Realtime channel open, joining {} room(s)", rooms.len());
        for room in rooms {
            if let Err(e) = self.send(&ClientFrame::Join(room.clone())) {
                log::warn!("Failed to join room {}: {}", room, e);
            }
        }
        self.listeners.dispatch(&RealtimeEvent::Connected);
    }

    fn on_message(&self, event: MessageEvent) {
        let Some(text) = event.data().as_string() else {
            log::debug!("Ignoring non-text realtime frame");
            return;
        };
        match ServerFrame::decode(&text) {
            Ok(frame) => {
                log::debug!("realtime ← {}", text);
                self.listeners.dispatch(&RealtimeEvent::from(frame));
            }
            Err(e) => log::debug!("Ignoring realtime frame ({}): {}", e, text),
        }
    }

    fn on_close(&self, event: CloseEvent) {
        log::info!("Realtime channel closed (code {}): {}", event.code(), event.reason());
        self.release();
        self.listeners.dispatch(&RealtimeEvent::Disconnected {
            reason: event.reason(),
        });
    }

    /// Detach and close the current socket. The closures may be the ones
    /// running right now, so they are dropped on the next tick.
    fn release(&self) {
        let socket = self.socket.borrow_mut().take();
        if let Some(socket) = socket {
            socket.set_onopen(None);
            socket.set_onmessage(None);
            socket.set_onclose(None);
            socket.set_onerror(None);
            let state = socket.ready_state();
            if state == WebSocket::OPEN || state == WebSocket::CONNECTING {
                let _ = socket.close();
            }
        }
        let handlers = self.handlers.borrow_mut().take();
        if let Some(handlers) = handlers {
            wasm_bindgen_futures::spawn_local(async move { drop(handlers) });
        }
    }
}

impl RealtimePort for WebSocketChannel {
    fn connect(&self) -> Result<()> {
        if self.shared.socket.borrow().is_some() {
            return Ok(());
        }
        let socket = WebSocket::new(&self.shared.url).map_err(|e| {
            ConsoleError::Realtime(format!("Failed to open {}: {:?}", self.shared.url, e))
        })?;

        let weak = Rc::downgrade(&self.shared);
        let onopen = {
            let weak = weak.clone();
            Closure::wrap(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_open();
                }
            }) as Box<dyn FnMut()>)
        };
        let onmessage = {
            let weak = weak.clone();
            Closure::wrap(Box::new(move |event: MessageEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_message(event);
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        let onclose = Closure::wrap(Box::new(move |event: CloseEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_close(event);
            }
        }) as Box<dyn FnMut(CloseEvent)>);
        // Browsers give no detail here; a close event always follows
        let onerror = Closure::wrap(Box::new(move |event: Event| {
            log::error!("Realtime channel error ({})", event.type_());
        }) as Box<dyn FnMut(Event)>);

        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        log::info!("Connecting realtime channel to {}", self.shared.url);
        *self.shared.socket.borrow_mut() = Some(socket);
        *self.shared.handlers.borrow_mut() = Some(SocketHandlers {
            _onopen: onopen,
            _onmessage: onmessage,
            _onclose: onclose,
            _onerror: onerror,
        });
        Ok(())
    }

    fn disconnect(&self) {
        if self.shared.socket.borrow().is_none() {
            return;
        }
        self.shared.release();
        self.shared.listeners.dispatch(&RealtimeEvent::Disconnected {
            reason: "client disconnect".to_string(),
        });
    }

    fn is_connected(&self) -> bool {
        self.shared
            .socket
            .borrow()
            .as_ref()
            .is_some_and(|s| s.ready_state() == WebSocket::OPEN)
    }

    fn join(&self, room: &str) -> Result<()> {
        if !self.shared.rooms.borrow_mut().insert(room.to_string()) {
            return Ok(());
        }
        self.shared.send(&ClientFrame::Join(room.to_string()))
    }

    fn leave(&self, room: &str) -> Result<()> {
        if !self.shared.rooms.borrow_mut().remove(room) {
            return Ok(());
        }
        self.shared.send(&ClientFrame::Leave(room.to_string()))
    }

    fn on(&self, kind: RealtimeEventKind, handler: RealtimeHandler) -> ListenerId {
        self.shared.listeners.add(kind, handler)
    }

    fn off(&self, id: ListenerId) {
        self.shared.listeners.remove(id);
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.shared.release();
    }
}
