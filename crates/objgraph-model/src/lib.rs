//! Runtime object model for objgraph.
//!
//! Applications describe their types declaratively as [`RuntimeType`]s and
//! hold live instances as [`ObjRef`] handles. Identity is the allocation
//! behind a handle, never its content, which is what the object registry
//! tracks and what the storer deduplicates on.
//!
//! # Key Types
//!
//! - [`RuntimeType`]: type name plus a [`TypeShape`] (record members, enum
//!   constants, or a built-in container shape)
//! - [`ObjRef`]: shared, lockable handle to one instance
//! - [`Value`]: primitive, inline, or reference member value
//! - [`HashedSet`] / [`HashedMap`]: hash-organized containers that can be
//!   populated before their elements' hashes are valid and rehashed later

pub mod error;
pub mod hashed;
pub mod object;
pub mod runtime_type;
pub mod value;

pub use error::{ModelError, ModelResult};
pub use hashed::{HashedMap, HashedSet};
pub use object::{ObjRef, ObjectBody, WeakObjRef};
pub use runtime_type::{
    MemberDescriptor, MemberType, RuntimeType, TypeShape, BYTES_TYPE, LIST_TYPE, MAP_TYPE,
    SET_TYPE, TEXT_TYPE,
};
pub use value::Value;
