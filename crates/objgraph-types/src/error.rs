use thiserror::Error;

/// Errors produced by identifier operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidObjectId(u64),

    #[error("invalid type id: {0}")]
    InvalidTypeId(u64),

    #[error("object id range exhausted at {0}")]
    ObjectIdsExhausted(u64),

    #[error("type id range exhausted at {0}")]
    TypeIdsExhausted(u64),

    #[error("unknown primitive kind: {0}")]
    UnknownPrimitive(String),
}
