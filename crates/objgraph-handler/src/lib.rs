//! Type handlers for objgraph.
//!
//! A [`TypeHandler`] moves instances of one runtime type in and out of
//! binary records. Record types get a [`ReflectiveHandler`] generated from
//! their declared members, enums an [`EnumHandler`] that owns the constant
//! instances, and the built-in text, bytes and container shapes a
//! hand-written [`BuiltinHandler`].
//!
//! The [`TypeHandlerRegistry`] creates handlers on first use, assigns their
//! type ids, and resolves the handler for a stored type id, delegating to a
//! [`LegacyTypeHandlerCreator`] when the stored definition no longer matches
//! the runtime shape.

pub mod alias;
pub mod codec;
pub mod custom;
pub mod enumeration;
pub mod error;
pub mod handler;
pub mod reflective;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use alias::AliasHandler;
pub use codec::RawValue;
pub use custom::{builtin_members, BuiltinHandler};
pub use enumeration::{enum_members, EnumHandler};
pub use error::{HandlerError, HandlerResult};
pub use handler::{LegacyTypeHandlerCreator, ObjectLookup, ReferenceResolver, TypeHandler};
pub use reflective::{record_members, ReflectiveHandler};
pub use registry::{create_handler, definition_members, TypeHandlerRegistry};
