/// Errors from runtime object model operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    /// The type has no member with this name.
    #[error("type {type_name} has no member '{member}'")]
    UnknownMember { type_name: String, member: String },

    /// A value does not fit the declared member type.
    #[error("member {type_name}#{member} expects {expected}, got {found}")]
    ValueMismatch {
        type_name: String,
        member: String,
        expected: String,
        found: String,
    },

    /// An instance body does not match its runtime type's shape.
    #[error("instance of {type_name} is not a {expected}")]
    ShapeMismatch {
        type_name: String,
        expected: &'static str,
    },

    /// Two elements of a hashed container are equal.
    #[error("duplicate key in {type_name}")]
    DuplicateKey { type_name: String },

    /// The enum type has no constant with this name.
    #[error("enum {type_name} has no constant '{constant}'")]
    UnknownConstant { type_name: String, constant: String },
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
