use objgraph_types::TypeId;

/// Errors from type dictionary operations.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// A type id is already bound to a different definition.
    #[error("type id {type_id} is already defined as {existing}, cannot redefine as {proposed}")]
    Conflict {
        type_id: TypeId,
        existing: String,
        proposed: String,
    },

    /// No definition is registered under this id.
    #[error("unknown type id: {0}")]
    UnknownTypeId(TypeId),

    /// Malformed dictionary or mapping text.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Member mappings move one old type onto several new types.
    #[error("type {source_type} is mapped onto several types: {targets:?}")]
    AmbiguousTypeMapping {
        source_type: String,
        targets: Vec<String>,
    },

    /// I/O error reading a mapping or dictionary file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DictionaryError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result alias for dictionary operations.
pub type DictionaryResult<T> = Result<T, DictionaryError>;
