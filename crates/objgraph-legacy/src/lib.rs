//! Legacy type resolution for objgraph.
//!
//! When a stored type definition no longer matches the runtime shape of its
//! type, the [`LegacyTypeResolver`] maps the old members onto the current
//! ones and builds a handler that translates old records on load.
//!
//! Mapping order:
//!
//! 1. [`RefactoringMapping`](objgraph_dictionary::RefactoringMapping)
//!    entries, which always win
//! 2. greedy matching of the remaining members by [`MemberSimilator`] score
//! 3. old members left over are read and discarded; current members left
//!    over keep their default value
//!
//! The resulting [`LegacyTypeMapping`] passes through a [`MappingResultor`]
//! that logs it or, in strict mode, rejects it.

pub mod error;
pub mod handler;
pub mod mapping;
pub mod matcher;
pub mod resolver;
pub mod resultor;
pub mod similarity;

pub use error::{LegacyError, LegacyResult};
pub use handler::{LegacyEnumHandler, LegacyTypeHandler};
pub use mapping::{LegacyTypeMapper, LegacyTypeMapping, MemberSource};
pub use matcher::{
    ConvertibleValidator, MatchValidator, MemberMatch, MemberMatcher,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use resolver::LegacyTypeResolver;
pub use resultor::{LoggingResultor, MappingResultor, StrictResultor};
pub use similarity::{
    levenshtein, name_similarity, MemberSimilator, TypeSimilarity, TypeSimilarityEntry,
    DEFAULT_WIDENING_SIMILARITY,
};
