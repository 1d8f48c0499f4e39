use objgraph_binary::{BinaryRecord, CommitBatch};
use objgraph_types::ObjectId;

use crate::error::StoreResult;

/// Sink for committed batches.
///
/// Implementations must satisfy these invariants:
/// - `write` is atomic: after it returns, either every record and the
///   dictionary text of the batch are visible to readers, or none of them.
/// - A later record for an object id replaces the earlier one.
/// - Errors are returned, never swallowed. Retrying is the caller's decision.
pub trait PersistenceTarget: Send + Sync {
    fn write(&self, batch: &CommitBatch) -> StoreResult<()>;
}

/// Source of committed records and the type dictionary.
pub trait PersistenceSource: Send + Sync {
    /// Latest record of every stored object, ordered by object id.
    fn read_all(&self) -> StoreResult<Vec<BinaryRecord>>;

    /// Latest records of the requested ids that exist. Unknown ids are skipped.
    fn read_by_object_ids(&self, object_ids: &[ObjectId]) -> StoreResult<Vec<BinaryRecord>>;

    /// Text form of every type definition written so far.
    fn read_type_dictionary(&self) -> StoreResult<String>;

    /// Highest allocated object id in storage. Reserved constant ids are not
    /// counted.
    fn highest_object_id(&self) -> StoreResult<Option<ObjectId>>;
}

/// A channel that is both target and source.
pub trait PersistenceChannel: PersistenceTarget + PersistenceSource {}

impl<T: PersistenceTarget + PersistenceSource> PersistenceChannel for T {}

/// Summary counters of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Commits written.
    pub commits: u64,
    /// Distinct object ids with a record.
    pub records: u64,
    /// Bytes of the latest record of every object.
    pub record_bytes: u64,
}
