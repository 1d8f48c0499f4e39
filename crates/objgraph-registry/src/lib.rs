//! Object registry for objgraph.
//!
//! [`ObjectRegistry`] maps live [`ObjRef`](objgraph_model::ObjRef) identities
//! to persistent [`ObjectId`](objgraph_types::ObjectId)s and back. It never
//! aliases two instances to one id and never gives one instance two ids.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::ObjectRegistry;
