//! Console App: WASM entry point.
//!
//! This crate is the composition root (DI wiring layer).
//! It assembles the platform adapters, hands them to the chat coordinator,
//! and exposes the result to the dashboard as `ChatConsole`.

mod console;
pub mod status;


use wasm_bindgen::prelude::*;

pub use console::ChatConsole;

/// WASM entry point: runs when the module is instantiated
#[wasm_bindgen(start)]
pub fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Chat console WASM starting...");
}
