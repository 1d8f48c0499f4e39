//! Storage channels for objgraph.
//!
//! The engine writes committed batches through a [`PersistenceTarget`] and
//! reads records and the type dictionary back through a
//! [`PersistenceSource`]. The core never knows what is behind them.
//!
//! # Channels
//!
//! - [`InMemoryChannel`]: latest record per object id, for tests and embedding
//! - [`FileChannel`]: append-only segment of CRC-framed commits
//!
//! # Design Rules
//!
//! 1. A batch becomes visible whole or not at all.
//! 2. The latest record written for an object id is the one read back.
//! 3. All I/O errors are propagated, never silently ignored.

pub mod channel;
pub mod error;
pub mod file;
pub mod memory;

pub use channel::{ChannelStats, PersistenceChannel, PersistenceSource, PersistenceTarget};
pub use error::{StoreError, StoreResult};
pub use file::{FileChannel, FileChannelConfig, SyncMode, SEGMENT_FILE};
pub use memory::InMemoryChannel;
