use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use objgraph_binary::{BinaryRecord, CommitBatch};
use objgraph_types::ObjectId;
use tracing::debug;

use crate::channel::{ChannelStats, PersistenceSource, PersistenceTarget};
use crate::error::{StoreError, StoreResult};

/// In-memory channel keeping the latest record per object id.
///
/// Intended for tests and embedding. A batch is applied under one write lock,
/// so readers see all of it or none of it. [`fail_next_write`](Self::fail_next_write)
/// makes the next write fail without applying anything.
pub struct InMemoryChannel {
    state: RwLock<MemoryState>,
    fail_next: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<ObjectId, BinaryRecord>,
    dictionary: String,
    commits: u64,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next [`write`](PersistenceTarget::write) fail.
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Latest record of one object.
    pub fn record(&self, object_id: ObjectId) -> Option<BinaryRecord> {
        self.state
            .read()
            .expect("lock poisoned")
            .records
            .get(&object_id)
            .cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.state.read().expect("lock poisoned");
        ChannelStats {
            commits: state.commits,
            records: state.records.len() as u64,
            record_bytes: state.records.values().map(BinaryRecord::encoded_len).sum(),
        }
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceTarget for InMemoryChannel {
    fn write(&self, batch: &CommitBatch) -> StoreResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::InjectedFailure);
        }
        let mut state = self.state.write().expect("lock poisoned");
        for record in &batch.records {
            state.records.insert(record.object_id, record.clone());
        }
        state.dictionary.push_str(&batch.dictionary_text);
        state.commits += 1;
        debug!(
            records = batch.records.len(),
            bytes = batch.byte_len(),
            "in-memory commit"
        );
        Ok(())
    }
}

impl PersistenceSource for InMemoryChannel {
    fn read_all(&self) -> StoreResult<Vec<BinaryRecord>> {
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .records
            .values()
            .cloned()
            .collect())
    }

    fn read_by_object_ids(&self, object_ids: &[ObjectId]) -> StoreResult<Vec<BinaryRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(object_ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    fn read_type_dictionary(&self) -> StoreResult<String> {
        Ok(self.state.read().expect("lock poisoned").dictionary.clone())
    }

    fn highest_object_id(&self) -> StoreResult<Option<ObjectId>> {
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .records
            .keys()
            .rev()
            .find(|id| !id.is_constant())
            .copied())
    }
}

impl std::fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use objgraph_types::TypeId;

    fn record(id: u64, content: &'static [u8]) -> BinaryRecord {
        BinaryRecord::new(
            TypeId::from_raw(1_000_000),
            ObjectId::from_raw(id),
            Bytes::from_static(content),
        )
    }

    #[test]
    fn latest_record_wins() {
        let channel = InMemoryChannel::new();
        channel
            .write(&CommitBatch::new(vec![record(1, b"a"), record(2, b"b")], "t1\n".into()))
            .unwrap();
        channel
            .write(&CommitBatch::new(vec![record(1, b"c")], "t2\n".into()))
            .unwrap();

        assert_eq!(channel.len(), 2);
        assert_eq!(channel.record(ObjectId::from_raw(1)).unwrap().content, &b"c"[..]);
        assert_eq!(channel.read_type_dictionary().unwrap(), "t1\nt2\n");
        assert_eq!(channel.stats().commits, 2);
    }

    #[test]
    fn read_by_ids_skips_unknown() {
        let channel = InMemoryChannel::new();
        channel
            .write(&CommitBatch::new(vec![record(5, b"x")], String::new()))
            .unwrap();
        let found = channel
            .read_by_object_ids(&[ObjectId::from_raw(5), ObjectId::from_raw(6)])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object_id, ObjectId::from_raw(5));
    }

    #[test]
    fn injected_failure_applies_nothing() {
        let channel = InMemoryChannel::new();
        channel.fail_next_write();
        let result = channel.write(&CommitBatch::new(vec![record(1, b"a")], "t\n".into()));
        assert!(matches!(result, Err(StoreError::InjectedFailure)));
        assert!(channel.is_empty());
        assert_eq!(channel.read_type_dictionary().unwrap(), "");

        // Only one write fails.
        channel
            .write(&CommitBatch::new(vec![record(1, b"a")], String::new()))
            .unwrap();
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn highest_id_ignores_constants() {
        let channel = InMemoryChannel::new();
        assert_eq!(channel.highest_object_id().unwrap(), None);
        channel
            .write(&CommitBatch::new(
                vec![record(7, b""), record(ObjectId::ROOT.as_u64(), b"")],
                String::new(),
            ))
            .unwrap();
        assert_eq!(channel.highest_object_id().unwrap(), Some(ObjectId::from_raw(7)));
    }
}
