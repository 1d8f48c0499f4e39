//! Storing and loading object graphs.
//!
//! [`Persistence`] ties the object registry, type dictionary, type handlers
//! and a storage channel together. Applications create a [`Storer`] to write
//! a transaction of instances and a [`Loader`] to read instances back.
//!
//! ```no_run
//! use objgraph_engine::Persistence;
//! use objgraph_model::{MemberDescriptor, ObjRef, RuntimeType};
//! use objgraph_types::PrimitiveKind;
//!
//! # fn main() -> objgraph_engine::EngineResult<()> {
//! let persistence = Persistence::builder().directory("data").build()?;
//! let point = persistence.register_type(RuntimeType::record(
//!     "app.Point",
//!     vec![
//!         MemberDescriptor::primitive("x", PrimitiveKind::I32),
//!         MemberDescriptor::primitive("y", PrimitiveKind::I32),
//!     ],
//! ))?;
//!
//! let p = ObjRef::blank(point);
//! p.set("x", 3)?;
//! let id = persistence.store(&p)?;
//! assert!(persistence.get(id)?.ptr_eq(&p));
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! - One instance is written at most once per commit, and references to it
//!   always carry the same object id.
//! - A commit is atomic: its records, new type definitions and id bindings
//!   all become visible together, or none of them do.
//! - A load returns the instance already bound to an id when there is one.
//!   Otherwise it creates every instance before any is populated, so cycles
//!   come back as cycles, and binds them only once all are complete.
//!
//! [`Serializer`] and [`ObjectCopier`] run the same machinery over a private
//! in-memory channel to turn a graph into standalone bytes or a deep copy.

pub mod config;
mod context;
pub mod error;
pub mod loader;
pub mod persistence;
pub mod root;
pub mod serializer;
pub mod storer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{IdConfig, LegacyConfig, PersistenceConfig, StorageConfig, StorerConfig};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use loader::Loader;
pub use persistence::{Persistence, PersistenceBuilder};
pub use root::{root_type, ROOT_TYPE};
pub use serializer::{ObjectCopier, Serializer, SERIALIZED_FORMAT};
pub use storer::{CommitListener, CommitSummary, Storer, StorerMode};
