use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConsoleError {
    /// The backend answered with an `{ error }` body.
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Realtime channel error: {0}")]
    Realtime(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JS interop error: {0}")]
    JsInterop(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ConsoleError {
    fn from(e: serde_json::Error) -> Self {
        ConsoleError::Serialization(e.to_string())
    }
}
