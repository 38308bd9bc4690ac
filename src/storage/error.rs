use thiserror::Error;

/// Storage layer error type.
///
/// The in-memory reference store never fails, but the contract is fallible
/// so that durable backends can surface connection and encoding problems
/// without changing the interface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Encoding or decoding a persisted instance failed.
    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),

    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The operation is not supported by this storage backend.
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
