//! Pick a storage backend.
//!
//! Priority: localStorage → Memory (fallback)

use std::rc::Rc;
use console_core::ports::StoragePort;
use console_types::{Result, config::StorageBackendType};
use super::{LocalStorage, MemoryStorage};

/// Open the best available backend. Never fails: without localStorage the
/// chat still works, it just does not survive a reload.
pub fn auto_detect_storage() -> Rc<dyn StoragePort> {
    match LocalStorage::open() {
        Ok(local) => {
            log::info!("Storage backend: localStorage");
            Rc::new(local)
        }
        Err(e) => {
            log::warn!("localStorage unavailable ({}), falling back to memory", e);
            Rc::new(MemoryStorage::new())
        }
    }
}

/// Open the configured backend. An explicit `LocalStorage` choice fails
/// instead of silently degrading.
pub fn open_storage(backend: &StorageBackendType) -> Result<Rc<dyn StoragePort>> {
    match backend {
        StorageBackendType::Auto => Ok(auto_detect_storage()),
        StorageBackendType::Memory => Ok(Rc::new(MemoryStorage::new())),
        StorageBackendType::LocalStorage => Ok(Rc::new(LocalStorage::open()?)),
    }
}
