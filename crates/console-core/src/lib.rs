pub mod ports;
pub mod event_bus;
pub mod listeners;
pub mod store;
pub mod coordinator;
mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod timer;

#[cfg(test)]
mod tests;
