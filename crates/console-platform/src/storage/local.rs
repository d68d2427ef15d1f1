//! `window.localStorage` backend.
//!
//! Shared by every tab on the origin, which is why the chat store re-reads
//! the conversation id before each request instead of trusting its cache.

use console_core::ports::StoragePort;
use console_types::{ConsoleError, Result};
use web_sys::Storage;

pub struct LocalStorage {
    storage: Storage,
}

impl LocalStorage {
    /// Fails when there is no window or the browser denies access
    /// (private mode, disabled cookies).
    pub fn open() -> Result<Self> {
        let window = web_sys::window()
            .ok_or_else(|| ConsoleError::Storage("No window object".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| ConsoleError::Storage(format!("localStorage denied: {:?}", e)))?
            .ok_or_else(|| ConsoleError::Storage("localStorage not available".to_string()))?;
        Ok(Self { storage })
    }
}

impl StoragePort for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|e| ConsoleError::Storage(format!("get {}: {:?}", key, e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // Throws QuotaExceededError when full
        self.storage
            .set_item(key, value)
            .map_err(|e| ConsoleError::Storage(format!("set {}: {:?}", key, e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.storage
            .remove_item(key)
            .map_err(|e| ConsoleError::Storage(format!("delete {}: {:?}", key, e)))
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let len = self
            .storage
            .length()
            .map_err(|e| ConsoleError::Storage(format!("{:?}", e)))?;
        let mut keys = Vec::new();
        for i in 0..len {
            if let Ok(Some(key)) = self.storage.key(i) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn backend_name(&self) -> &str {
        "localStorage"
    }
}
