use thiserror::Error;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
///
/// Client-facing failures travel over the WebSocket as inline error payloads;
/// this type only covers the storage-facing side of the engine.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}
