//! Credentials kept in the key-value store by the dashboard's login flow.

use std::rc::Rc;

use console_core::ports::{Credential, CredentialPort, StoragePort};
use console_types::{Result, config::StorageKeys};

pub struct StoredCredentials {
    storage: Rc<dyn StoragePort>,
    token_key: String,
    user_id_key: String,
}

impl StoredCredentials {
    pub fn new(storage: Rc<dyn StoragePort>, keys: &StorageKeys) -> Self {
        Self {
            storage,
            token_key: keys.token.clone(),
            user_id_key: keys.user_id.clone(),
        }
    }

    pub fn sign_in(&self, token: &str, user_id: Option<&str>) -> Result<()> {
        self.storage.set(&self.token_key, token)?;
        match user_id {
            Some(id) => self.storage.set(&self.user_id_key, id),
            None => self.storage.delete(&self.user_id_key),
        }
    }

    pub fn sign_out(&self) -> Result<()> {
        self.storage.delete(&self.token_key)?;
        self.storage.delete(&self.user_id_key)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("Failed to read {}: {}", key, e);
                None
            }
        }
    }
}

impl CredentialPort for StoredCredentials {
    fn credential(&self) -> Option<Credential> {
        let token = self.read(&self.token_key)?;
        Some(Credential {
            token,
            user_id: self.read(&self.user_id_key),
        })
    }
}
