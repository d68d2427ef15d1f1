use serde::{Deserialize, Serialize};

/// Top-level console configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub storage: StorageConfig,
    /// How long to wait for a plan result after the backend accepted an approval
    pub approval_timeout_ms: u64,
    pub demo: DemoConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            realtime: RealtimeConfig::default(),
            storage: StorageConfig::default(),
            approval_timeout_ms: DEFAULT_APPROVAL_TIMEOUT_MS,
            demo: DemoConfig::default(),
        }
    }
}

pub const DEFAULT_APPROVAL_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Empty means same origin
    pub base_url: String,
    pub completion_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            completion_path: "/chat/completion".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn completion_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.completion_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub url: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendType,
    pub keys: StorageKeys,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Auto,
            keys: StorageKeys::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackendType {
    /// localStorage when available, memory otherwise
    Auto,
    Memory,
    LocalStorage,
}

/// Key names in the key-value store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub session_id: String,
    pub conversation_id: String,
    pub history: String,
    pub token: String,
    pub user_id: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            session_id: "chatSessionId".to_string(),
            conversation_id: "chatConversationId".to_string(),
            history: "chatHistory".to_string(),
            token: "token".to_string(),
            user_id: "userId".to_string(),
        }
    }
}

/// In-memory backend for local/demo use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub enabled: bool,
    /// Delay between an accepted approval and its plan result
    pub result_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            result_delay_ms: 1_500,
        }
    }
}
