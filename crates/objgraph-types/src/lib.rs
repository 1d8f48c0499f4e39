//! Foundation types for objgraph.
//!
//! This crate provides the identifier and primitive types shared by every
//! other objgraph crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Persistent identity of one stored instance
//! - [`TypeId`]: Persistent identity of one structural version of a type
//! - [`IdAllocator`]: Explicit, injectable source of new ids
//! - [`PrimitiveKind`]: Fixed-length value kinds a record member can hold
//!
//! # Id Ranges
//!
//! | Range                                   | Use                     |
//! |-----------------------------------------|-------------------------|
//! | `0`                                     | null / "no id"          |
//! | `1_000_000 ..`                          | type ids                |
//! | `1_000_000_000_000_000_000 ..`          | object ids              |
//! | `9_000_000_000_000_000_000 ..`          | reserved constants      |

pub mod allocator;
pub mod error;
pub mod id;
pub mod primitive;

pub use allocator::{IdAllocator, SequentialIdAllocator};
pub use error::TypeError;
pub use id::{
    ObjectId, TypeId, CONSTANT_ID_BASE, DEFAULT_START_OBJECT_ID, DEFAULT_START_TYPE_ID,
};
pub use primitive::PrimitiveKind;
