use objgraph_types::ObjectId;

/// Identity consistency violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The instance is already registered under a different id.
    #[error("instance of {type_name} is registered as {existing}, cannot register it as {requested}")]
    IdentityConflict {
        type_name: String,
        existing: ObjectId,
        requested: ObjectId,
    },

    /// The id is already bound to a different live instance.
    #[error("object id {object_id} is bound to another instance of {existing_type}")]
    AliasConflict {
        object_id: ObjectId,
        existing_type: String,
    },

    /// The null id cannot be registered.
    #[error("cannot register the null object id")]
    NullObjectId,
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
