use objgraph_dictionary::DictionaryError;
use objgraph_handler::HandlerError;

/// Errors from legacy type resolution.
#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    /// A refactoring entry cannot be applied to the current type.
    #[error("invalid mapping for {type_name}: {detail}")]
    InvalidMapping { type_name: String, detail: String },

    /// Strict resolution found members without a counterpart.
    #[error(
        "{type_name} needs an explicit mapping: discarded {discarded:?}, unmapped {unmapped:?}"
    )]
    UnmappedMembers {
        type_name: String,
        discarded: Vec<String>,
        unmapped: Vec<String>,
    },

    /// An old enum constant matches several current constants equally well.
    #[error("enum constant {type_name}.{constant} is ambiguous between {candidates:?}")]
    AmbiguousConstant {
        type_name: String,
        constant: String,
        candidates: Vec<String>,
    },

    /// Stored and current definitions are of different kinds.
    #[error("{type_name} changed between enum and record")]
    KindChanged { type_name: String },
}

/// Result alias for legacy resolution.
pub type LegacyResult<T> = Result<T, LegacyError>;
