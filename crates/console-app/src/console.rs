//! `ChatConsole`: the handle the dashboard holds.
//!
//! Wires storage, credentials, the completion client, the realtime channel
//! and timers into a `ChatCoordinator`, or swaps the HTTP and WebSocket
//! adapters for the in-memory `DemoBackend` when demo mode is on.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_utils::format::JsValueSerdeExt;
use js_sys::Promise;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use console_core::coordinator::{ChatCoordinator, ChatPorts};
use console_core::event_bus::EventBus;
use console_core::ports::*;
use console_platform::storage::{auto_detect_storage, open_storage};
use console_platform::{DemoBackend, GlooTimer, HttpCompletionClient, StoredCredentials, WebSocketChannel};
use console_types::config::{ConsoleConfig, StorageBackendType};
use console_types::realtime::{RealtimeEvent, RealtimeEventKind};

use crate::status::ConsoleStatus;

const CONFIG_STORAGE_KEY: &str = "console:config";

#[wasm_bindgen]
pub struct ChatConsole {
    coordinator: Rc<ChatCoordinator>,
    realtime: Rc<dyn RealtimePort>,
    credentials: Rc<StoredCredentials>,
    status: Rc<RefCell<ConsoleStatus>>,
    config: ConsoleConfig,
    connection_listeners: Vec<ListenerId>,
}

#[wasm_bindgen]
impl ChatConsole {
    /// `config` is an optional `ConsoleConfig` object. When given it replaces
    /// (and is saved over) the config remembered from the last visit.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<ChatConsole, JsValue> {
        let bootstrap = auto_detect_storage();
        let config = if config.is_undefined() || config.is_null() {
            restore_config(bootstrap.as_ref())
        } else {
            let config: ConsoleConfig = config
                .into_serde()
                .map_err(|e| js_error(format!("Invalid console config: {}", e)))?;
            save_config(bootstrap.as_ref(), &config);
            config
        };

        let storage = match config.storage.backend {
            StorageBackendType::Auto => bootstrap,
            ref backend => open_storage(backend).map_err(js_error)?,
        };
        let credentials = Rc::new(StoredCredentials::new(storage.clone(), &config.storage.keys));
        let timer: Rc<dyn TimerPort> = Rc::new(GlooTimer::new());

        let (completion, realtime): (Rc<dyn CompletionPort>, Rc<dyn RealtimePort>) =
            if config.demo.enabled {
                log::info!("Demo mode: backend simulated in memory");
                let demo = Rc::new(DemoBackend::new(&config.demo, timer.clone()));
                let completion: Rc<dyn CompletionPort> = demo.clone();
                let realtime: Rc<dyn RealtimePort> = demo;
                (completion, realtime)
            } else {
                let completion: Rc<dyn CompletionPort> = Rc::new(HttpCompletionClient::new(&config.api));
                let realtime: Rc<dyn RealtimePort> =
                    Rc::new(WebSocketChannel::new(config.realtime.url.clone()));
                (completion, realtime)
            };

        let status = Rc::new(RefCell::new(ConsoleStatus::new()));
        let connection_listeners = vec![
            realtime.on(RealtimeEventKind::Connected, {
                let status = status.clone();
                Box::new(move |_: &RealtimeEvent| status.borrow_mut().set_connected(true))
            }),
            realtime.on(RealtimeEventKind::Disconnected, {
                let status = status.clone();
                Box::new(move |_: &RealtimeEvent| status.borrow_mut().set_connected(false))
            }),
        ];

        let ports = ChatPorts {
            completion,
            realtime: realtime.clone(),
            storage,
            credentials: credentials.clone(),
            timer,
        };
        let coordinator = Rc::new(ChatCoordinator::new(ports, &config, EventBus::new()));

        Ok(ChatConsole {
            coordinator,
            realtime,
            credentials,
            status,
            config,
            connection_listeners,
        })
    }

    /// Open the realtime channel. Rooms joined so far are joined on open.
    pub fn connect(&self) -> Result<(), JsValue> {
        self.realtime.connect().map_err(js_error)
    }

    pub fn disconnect(&self) {
        self.realtime.disconnect();
    }

    #[wasm_bindgen(js_name = isConnected)]
    pub fn is_connected(&self) -> bool {
        self.realtime.is_connected()
    }

    /// Store the dashboard's login and join the user's room.
    #[wasm_bindgen(js_name = signIn)]
    pub fn sign_in(&self, token: &str, user_id: Option<String>) -> Result<(), JsValue> {
        self.credentials
            .sign_in(token, user_id.as_deref())
            .map_err(js_error)?;
        if let Some(user_id) = user_id {
            self.realtime.join(&user_id).map_err(js_error)?;
        }
        Ok(())
    }

    #[wasm_bindgen(js_name = signOut)]
    pub fn sign_out(&self) -> Result<(), JsValue> {
        if let Some(user_id) = self.credentials.credential().and_then(|c| c.user_id) {
            self.realtime.leave(&user_id).map_err(js_error)?;
        }
        self.credentials.sign_out().map_err(js_error)
    }

    /// Resolves with the chat view once the backend has answered.
    #[wasm_bindgen(js_name = sendMessage)]
    pub fn send_message(&self, text: String) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            coordinator.send_message(&text).await;
            to_js(&coordinator.view())
        })
    }

    /// Resolves once the backend accepted (or refused) the approval; the
    /// result itself shows up later in `view()` and `drainEvents()`.
    #[wasm_bindgen(js_name = approvePlan)]
    pub fn approve_plan(&self) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            coordinator.approve_plan().await;
            to_js(&coordinator.view())
        })
    }

    #[wasm_bindgen(js_name = rejectPlan)]
    pub fn reject_plan(&self, feedback: Option<String>) {
        self.coordinator.reject_plan(feedback.as_deref());
    }

    pub fn reset(&self) {
        self.coordinator.reset();
    }

    pub fn view(&self) -> Result<JsValue, JsValue> {
        to_js(&self.coordinator.view())
    }

    /// Events since the last call, oldest first. Also advances `status()`.
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&self) -> Result<JsValue, JsValue> {
        let events = self.coordinator.event_bus().drain();
        self.status.borrow_mut().process_events(&events);
        to_js(&events)
    }

    pub fn status(&self) -> Result<JsValue, JsValue> {
        to_js(&*self.status.borrow())
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_js(&self.config)
    }
}

impl Drop for ChatConsole {
    fn drop(&mut self) {
        for id in self.connection_listeners.drain(..) {
            self.realtime.off(id);
        }
    }
}

fn restore_config(storage: &dyn StoragePort) -> ConsoleConfig {
    match storage.get(CONFIG_STORAGE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<ConsoleConfig>(&raw) {
            Ok(config) => {
                log::info!("Config restored from {}", storage.backend_name());
                config
            }
            Err(e) => {
                log::warn!("Ignoring unreadable saved config: {}", e);
                ConsoleConfig::default()
            }
        },
        Ok(None) => ConsoleConfig::default(),
        Err(e) => {
            log::warn!("Failed to read saved config: {}", e);
            ConsoleConfig::default()
        }
    }
}

fn save_config(storage: &dyn StoragePort, config: &ConsoleConfig) {
    let saved = serde_json::to_string(config)
        .map_err(Into::into)
        .and_then(|json| storage.set(CONFIG_STORAGE_KEY, &json));
    match saved {
        Ok(()) => log::info!("Config saved to {}", storage.backend_name()),
        Err(e) => log::warn!("Failed to save config: {}", e),
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    JsValue::from_serde(value).map_err(js_error)
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}
