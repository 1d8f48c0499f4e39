//! Type dictionary for objgraph.
//!
//! Every persisted record names a [`TypeId`](objgraph_types::TypeId); the
//! dictionary resolves it to the immutable [`TypeDefinition`] that describes
//! the record's layout. The dictionary is written next to the data in a
//! line-oriented [`text`] form and read back before any record is decoded.
//!
//! A [`TypeLineage`] groups every definition a logical type has had, and a
//! [`RefactoringMapping`] lets an operator tell the legacy resolver how old
//! types and members were renamed.

pub mod definition;
pub mod dictionary;
pub mod error;
pub mod member;
pub mod refactoring;
pub mod text;

pub use definition::{TypeDefinition, TypeLineage};
pub use dictionary::TypeDictionary;
pub use error::{DictionaryError, DictionaryResult};
pub use member::{MemberKind, TypeMember};
pub use refactoring::{MemberTarget, RefactoringMapping};
