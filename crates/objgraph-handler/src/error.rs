use objgraph_binary::BinaryError;
use objgraph_dictionary::DictionaryError;
use objgraph_model::ModelError;
use objgraph_types::{ObjectId, TypeError, TypeId};

/// Errors from type handlers and the handler registry.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Id allocation failed.
    #[error(transparent)]
    Ids(#[from] TypeError),

    /// A record names a type id the dictionary does not know.
    #[error("unknown type id: {0}")]
    UnknownTypeId(TypeId),

    /// Stored data uses a type the application never registered.
    #[error("no runtime type registered for {0}")]
    UnknownRuntimeType(String),

    /// A type name is registered twice with different shapes.
    #[error("type {type_name} is already registered with a different shape")]
    TypeRedefined { type_name: String },

    /// A member value does not match its persisted kind.
    #[error("member {type_name}#{member} cannot persist {found}")]
    ValueMismatch {
        type_name: String,
        member: String,
        found: String,
    },

    /// A record references an id that is neither loaded nor loadable.
    #[error("object {from} references missing object {to}")]
    DanglingReference { from: ObjectId, to: ObjectId },

    /// A set element or map key is null.
    #[error("null element in {type_name} {object_id}")]
    NullElement { type_name: String, object_id: ObjectId },

    /// An enum record holds an ordinal outside the constant table.
    #[error("enum {type_name} has no ordinal {ordinal}")]
    InvalidOrdinal { type_name: String, ordinal: u32 },

    /// A stored definition cannot be reconciled with the runtime type.
    #[error("cannot map {type_name} ({old_type_id} -> {current_type_id}): {reason}")]
    SchemaMismatch {
        type_name: String,
        old_type_id: TypeId,
        current_type_id: TypeId,
        reason: String,
    },
}

/// Result alias for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;
