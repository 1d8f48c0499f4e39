use std::fmt;

use objgraph_dictionary::DictionaryError;
use objgraph_handler::HandlerError;
use objgraph_legacy::LegacyError;
use objgraph_model::ModelError;
use objgraph_registry::RegistryError;
use objgraph_store::StoreError;
use objgraph_types::{ObjectId, TypeError};

/// Coarse classification of engine failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity or hashing invariants were violated. The unit is aborted.
    Consistency,
    /// Stored and runtime schemas cannot be reconciled.
    Schema,
    /// An id range or buffer limit was exhausted.
    Capacity,
    /// The storage channel failed or returned malformed data.
    Transfer,
    /// The caller asked for something that cannot be done.
    Usage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Consistency => "consistency",
            Self::Schema => "schema",
            Self::Capacity => "capacity",
            Self::Transfer => "transfer",
            Self::Usage => "usage",
        };
        f.write_str(label)
    }
}

/// Errors from storing, loading and opening a persistence.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Legacy(#[from] LegacyError),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ids(#[from] TypeError),

    /// The records collected by a storer would exceed the configured limit.
    #[error("storer batch of {requested} bytes exceeds the maximum of {maximum} bytes")]
    CapacityExceeded { requested: u64, maximum: u64 },

    /// No record exists for a requested object id.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// The object stored under an id has a different type than requested.
    #[error("object {object_id} is a {found}, not a {expected}")]
    TypeMismatch {
        object_id: ObjectId,
        expected: String,
        found: String,
    },

    /// Serialized graph bytes could not be decoded.
    #[error("malformed serialized graph: {0}")]
    Malformed(String),

    /// A sub-storer belongs to a different persistence.
    #[error("sub-storer belongs to a different persistence")]
    ForeignStorer,

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error outside the storage channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Registry(_) => ErrorCategory::Consistency,
            Self::Handler(e) => handler_category(e),
            Self::Legacy(LegacyError::Handler(e)) => handler_category(e),
            Self::Legacy(_) | Self::Dictionary(_) => ErrorCategory::Schema,
            Self::Model(e) => model_category(e),
            Self::Store(StoreError::FrameTooLarge { .. }) => ErrorCategory::Capacity,
            Self::Store(_) | Self::Io(_) | Self::Malformed(_) => ErrorCategory::Transfer,
            Self::Ids(e) => ids_category(e),
            Self::CapacityExceeded { .. } => ErrorCategory::Capacity,
            Self::ObjectNotFound(_)
            | Self::TypeMismatch { .. }
            | Self::ForeignStorer
            | Self::Config(_) => ErrorCategory::Usage,
        }
    }
}

fn handler_category(e: &HandlerError) -> ErrorCategory {
    match e {
        HandlerError::Binary(_) => ErrorCategory::Transfer,
        HandlerError::Dictionary(_)
        | HandlerError::UnknownTypeId(_)
        | HandlerError::UnknownRuntimeType(_)
        | HandlerError::TypeRedefined { .. }
        | HandlerError::InvalidOrdinal { .. }
        | HandlerError::SchemaMismatch { .. } => ErrorCategory::Schema,
        HandlerError::Model(e) => model_category(e),
        HandlerError::Ids(e) => ids_category(e),
        HandlerError::DanglingReference { .. } | HandlerError::NullElement { .. } => {
            ErrorCategory::Consistency
        }
        HandlerError::ValueMismatch { .. } => ErrorCategory::Usage,
    }
}

fn model_category(e: &ModelError) -> ErrorCategory {
    match e {
        ModelError::DuplicateKey { .. } => ErrorCategory::Consistency,
        _ => ErrorCategory::Usage,
    }
}

fn ids_category(e: &TypeError) -> ErrorCategory {
    match e {
        TypeError::ObjectIdsExhausted(_) | TypeError::TypeIdsExhausted(_) => ErrorCategory::Capacity,
        _ => ErrorCategory::Usage,
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
