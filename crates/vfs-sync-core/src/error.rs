use thiserror::Error;

/// Errors that can occur anywhere between the store and the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Message channel not initialized")]
    NotInitialized,

    #[error("Worker not ready for {0} request")]
    NotReady(String),

    #[error("Request {id} timed out after {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("{0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request {0} cancelled")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VfsError {
    /// Transient errors may succeed if the caller waits for readiness or retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, VfsError::NotReady(_) | VfsError::Timeout { .. })
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(err: serde_json::Error) -> Self {
        VfsError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for VfsError {
    fn from(err: base64::DecodeError) -> Self {
        VfsError::Serialization(format!("invalid base64 payload: {}", err))
    }
}
