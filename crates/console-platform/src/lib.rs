//! Browser adapters for the console-core ports.
//!
//! Everything here either talks to a browser API (`fetch`, `WebSocket`,
//! `localStorage`, `setTimeout`) or stands in for the backend in demo mode.

pub mod auth;
pub mod completion;
pub mod demo;
pub mod realtime;
pub mod storage;
pub mod timer;

pub use auth::StoredCredentials;
pub use completion::HttpCompletionClient;
pub use demo::DemoBackend;
pub use realtime::WebSocketChannel;
pub use timer::GlooTimer;
