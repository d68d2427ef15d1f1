pub mod message;
pub mod plan;
pub mod wire;
pub mod realtime;
pub mod event;
pub mod config;
pub mod error;
pub mod session;


pub use error::ConsoleError;
pub type Result<T> = std::result::Result<T, ConsoleError>;
