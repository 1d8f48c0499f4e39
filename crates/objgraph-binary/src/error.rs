use objgraph_types::ObjectId;

/// Errors from binary record encoding and decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BinaryError {
    /// Fewer bytes remain than a field needs.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: u64, available: u64 },

    /// A record header declares an impossible length.
    #[error("invalid record length {length} (minimum {minimum})")]
    InvalidLength { length: u64, minimum: u64 },

    /// Text content is not valid UTF-8.
    #[error("invalid UTF-8 text in record {object_id}")]
    InvalidText { object_id: ObjectId },

    /// A char field does not hold a Unicode scalar value.
    #[error("invalid char value {0:#x}")]
    InvalidChar(u32),

    /// A variable-length field has a length that is not a multiple of its element size.
    #[error("malformed list of {length} bytes (element size {element_size})")]
    MalformedList { length: u64, element_size: u64 },

    /// Content was left over after all members were read.
    #[error("{remaining} unread bytes in record {object_id}")]
    TrailingBytes { object_id: ObjectId, remaining: u64 },
}

/// Result alias for binary operations.
pub type BinaryResult<T> = Result<T, BinaryError>;
