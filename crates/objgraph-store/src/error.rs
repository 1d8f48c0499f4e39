use objgraph_binary::BinaryError;

/// Errors from storage channels.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored record bytes are malformed.
    #[error("binary error: {0}")]
    Binary(#[from] BinaryError),

    /// A frame that passed recovery no longer verifies.
    #[error("corrupt frame at offset {offset}: {reason}")]
    CorruptFrame { offset: u64, reason: String },

    /// A commit is too large for one frame.
    #[error("commit of {length} bytes exceeds the frame limit of {limit} bytes")]
    FrameTooLarge { length: u64, limit: u64 },

    /// A write was refused by fault injection.
    #[error("injected write failure")]
    InjectedFailure,
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
