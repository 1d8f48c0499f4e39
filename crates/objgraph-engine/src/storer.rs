use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use objgraph_binary::{BinaryRecord, CommitBatch, RecordWriter};
use objgraph_dictionary::text;
use objgraph_handler::{HandlerResult, ReferenceResolver};
use objgraph_model::ObjRef;
use objgraph_types::ObjectId;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};

/// How a storer treats referenced instances that already have an object id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorerMode {
    /// Skip them. Only newly encountered instances are written.
    Lazy,
    /// Write them again, together with everything they reference.
    Eager,
}

/// Why an instance is registered with a storer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Intent {
    /// Always recorded. Used for explicitly stored instances.
    Guaranteed,
    /// Recorded only if the instance has no object id yet.
    LazyOptional,
    /// Recorded even if the instance already has an object id.
    EagerOptional,
}

/// Outcome of a successful commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub records: usize,
    pub bytes: u64,
    /// Type definitions written for the first time.
    pub new_types: usize,
}

/// Notified after every successful commit of the storer it is registered with.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, summary: &CommitSummary);
}

/// Collects one transaction of records by walking the reference graph of the
/// stored instances, and commits them atomically.
///
/// Every instance gets at most one record per commit. Instances met through
/// references are recorded only if they have no object id yet, unless the
/// storer is [`StorerMode::Eager`]. Traversal uses a work queue, so graph
/// depth is not limited by the call stack, and cycles end because every
/// instance is bound to its id before its record is written.
///
/// Records stay in memory until [`commit`](Self::commit). A failed store or
/// commit discards everything the storer collected.
pub struct Storer {
    ctx: Arc<EngineContext>,
    mode: StorerMode,
    /// Ids decided by this storer, by instance identity.
    ids: HashMap<usize, ObjectId>,
    /// Bindings registered with the object registry on commit.
    entries: Vec<(ObjectId, ObjRef)>,
    /// Skipped instances and the id references to them are written as.
    skips: HashMap<usize, (ObjectId, ObjRef)>,
    queue: VecDeque<(ObjectId, ObjRef)>,
    records: Vec<BinaryRecord>,
    recorded: HashSet<ObjectId>,
    byte_len: u64,
    sub_storers: Vec<Storer>,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl Storer {
    pub(crate) fn new(ctx: Arc<EngineContext>, mode: StorerMode) -> Self {
        Self {
            ctx,
            mode,
            ids: HashMap::new(),
            entries: Vec::new(),
            skips: HashMap::new(),
            queue: VecDeque::new(),
            records: Vec::new(),
            recorded: HashSet::new(),
            byte_len: 0,
            sub_storers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn mode(&self) -> StorerMode {
        self.mode
    }

    /// Store `instance` and everything it references. The instance itself is
    /// always recorded, even if it was stored before.
    pub fn store(&mut self, instance: &ObjRef) -> EngineResult<ObjectId> {
        self.store_root(instance, None)
    }

    /// Store `instance` under `object_id`.
    ///
    /// If the instance is already bound to a different id, the commit fails
    /// with a consistency error.
    pub fn store_with_id(&mut self, instance: &ObjRef, object_id: ObjectId) -> EngineResult<ObjectId> {
        self.store_root(instance, Some(object_id))
    }

    pub fn store_all(&mut self, instances: &[ObjRef]) -> EngineResult<Vec<ObjectId>> {
        instances.iter().map(|i| self.store(i)).collect()
    }

    fn store_root(&mut self, instance: &ObjRef, explicit: Option<ObjectId>) -> EngineResult<ObjectId> {
        let result = self
            .register(instance, Intent::Guaranteed, explicit)
            .map_err(EngineError::from)
            .and_then(|id| self.drain().map(|()| id));
        if let Err(e) = &result {
            warn!(error = %e, type_name = %instance.type_name(), "store aborted");
            self.clear();
        }
        result
    }

    /// Do not record `instance`. References to it use its registered object
    /// id, or the null id if it has none.
    ///
    /// Returns `true` if the skip is new.
    pub fn skip(&mut self, instance: &ObjRef) -> bool {
        let object_id = self
            .ctx
            .objects
            .lookup_object_id(instance)
            .unwrap_or(ObjectId::NULL);
        self.skip_mapped(instance, object_id)
    }

    /// Do not record `instance`, and write every reference to it as null.
    pub fn skip_nulled(&mut self, instance: &ObjRef) -> bool {
        self.skip_mapped(instance, ObjectId::NULL)
    }

    /// Do not record `instance`, and write every reference to it as `object_id`.
    pub fn skip_mapped(&mut self, instance: &ObjRef, object_id: ObjectId) -> bool {
        match self.skips.entry(instance.identity()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert((object_id, instance.clone()));
                true
            }
        }
    }

    /// Tie `other` into this storer's transaction: its records are written
    /// by this storer's commit, in the same atomic batch.
    pub fn register_sub_storer(&mut self, other: Storer) -> EngineResult<()> {
        if !Arc::ptr_eq(&self.ctx, &other.ctx) {
            return Err(EngineError::ForeignStorer);
        }
        self.sub_storers.push(other);
        Ok(())
    }

    pub fn register_commit_listener(&mut self, listener: Arc<dyn CommitListener>) {
        self.listeners.push(listener);
    }

    /// Distinct instances bound or skipped by this storer.
    pub fn size(&self) -> usize {
        self.ids.len() + self.skips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Records collected so far, sub-storers excluded.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Bytes collected so far, sub-storers excluded.
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn maximum_capacity(&self) -> u64 {
        self.ctx.max_batch_bytes
    }

    /// Discard everything collected, skips and sub-storers included.
    /// Committed data is not affected.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.entries.clear();
        self.skips.clear();
        self.queue.clear();
        self.records.clear();
        self.recorded.clear();
        self.byte_len = 0;
        self.sub_storers.clear();
    }

    /// Write everything this storer and its sub-storers collected as one
    /// atomic batch, then register the new bindings.
    ///
    /// Binding conflicts and the capacity of the merged batch are checked
    /// before anything is written. Either way the storer is empty afterwards.
    pub fn commit(&mut self) -> EngineResult<CommitSummary> {
        let mut entries = Vec::new();
        let mut records = Vec::new();
        self.collect(&mut entries, &mut records);
        self.clear();

        let maximum = self.ctx.max_batch_bytes;
        let requested: u64 = records.iter().map(BinaryRecord::encoded_len).sum();
        if requested > maximum {
            warn!(requested, maximum, "merged batch exceeds capacity; nothing written");
            return Err(EngineError::CapacityExceeded { requested, maximum });
        }

        let ctx = Arc::clone(&self.ctx);
        let dictionary = ctx.handlers.dictionary();
        let result: EngineResult<CommitSummary> = ctx.objects.register_all_with(&entries, || {
            let pending = dictionary.pending_definitions();
            let batch = CommitBatch::new(records, text::assemble(pending.iter().map(|d| &**d)));
            if !batch.is_empty() {
                ctx.channel.write(&batch)?;
            }
            dictionary.mark_persisted(pending.iter().map(|d| d.type_id));
            Ok(CommitSummary {
                records: batch.records.len(),
                bytes: batch.byte_len(),
                new_types: pending.len(),
            })
        });

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, bindings = entries.len(), "commit failed; nothing written");
                return Err(e);
            }
        };
        info!(
            records = summary.records,
            bytes = summary.bytes,
            new_types = summary.new_types,
            "commit"
        );
        for listener in &self.listeners {
            listener.on_commit(&summary);
        }
        Ok(summary)
    }

    fn collect(&mut self, entries: &mut Vec<(ObjectId, ObjRef)>, records: &mut Vec<BinaryRecord>) {
        for sub in &mut self.sub_storers {
            sub.collect(entries, records);
        }
        entries.append(&mut self.entries);
        records.append(&mut self.records);
    }

    fn register(
        &mut self,
        instance: &ObjRef,
        intent: Intent,
        explicit: Option<ObjectId>,
    ) -> HandlerResult<ObjectId> {
        let key = instance.identity();
        if let Some((object_id, _)) = self.skips.get(&key) {
            return Ok(*object_id);
        }
        if let Some(object_id) = explicit {
            if self.ids.get(&key) != Some(&object_id) {
                self.ids.insert(key, object_id);
                self.entries.push((object_id, instance.clone()));
            }
            self.enqueue(object_id, instance);
            return Ok(object_id);
        }
        if let Some(&object_id) = self.ids.get(&key) {
            if intent == Intent::Guaranteed {
                self.enqueue(object_id, instance);
            }
            return Ok(object_id);
        }

        let object_id = match self.ctx.objects.lookup_object_id(instance) {
            Some(known) if intent == Intent::LazyOptional => return Ok(known),
            Some(known) => known,
            None => self.ctx.allocator.next_object_id()?,
        };
        self.ids.insert(key, object_id);
        self.entries.push((object_id, instance.clone()));
        self.enqueue(object_id, instance);
        Ok(object_id)
    }

    fn enqueue(&mut self, object_id: ObjectId, instance: &ObjRef) {
        if !self.recorded.contains(&object_id) {
            self.queue.push_back((object_id, instance.clone()));
        }
    }

    fn drain(&mut self) -> EngineResult<()> {
        while let Some((object_id, instance)) = self.queue.pop_front() {
            if !self.recorded.insert(object_id) {
                continue;
            }
            let handler = self.ctx.handlers.handler_for_instance(&instance)?;
            let mut writer = RecordWriter::new(handler.type_id(), object_id);
            handler.store(&mut writer, &instance, self)?;
            let record = writer.finish();

            let byte_len = self.byte_len + record.encoded_len();
            if byte_len > self.ctx.max_batch_bytes {
                return Err(EngineError::CapacityExceeded {
                    requested: byte_len,
                    maximum: self.ctx.max_batch_bytes,
                });
            }
            self.byte_len = byte_len;
            debug!(
                object_id = %object_id,
                type_id = %handler.type_id(),
                len = record.encoded_len(),
                "record collected"
            );
            self.records.push(record);
        }
        Ok(())
    }
}

impl ReferenceResolver for Storer {
    fn resolve(&mut self, object: &ObjRef) -> HandlerResult<ObjectId> {
        let intent = match self.mode {
            StorerMode::Lazy => Intent::LazyOptional,
            StorerMode::Eager => Intent::EagerOptional,
        };
        self.register(object, intent, None)
    }
}

impl fmt::Debug for Storer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storer")
            .field("mode", &self.mode)
            .field("size", &self.size())
            .field("records", &self.records.len())
            .field("bytes", &self.byte_len)
            .field("sub_storers", &self.sub_storers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceConfig;
    use crate::error::ErrorCategory;
    use crate::persistence::Persistence;
    use crate::testing::{memory_persistence, node, node_type, point, reopen, RecordingListener};
    use objgraph_store::PersistenceSource;

    #[test]
    fn shared_instance_is_written_once() {
        let (p, channel) = memory_persistence();
        let shared = node(&p, "shared");
        let a = node(&p, "a");
        a.set("next", shared.clone()).unwrap();
        let c = node(&p, "c");
        c.set("next", shared.clone()).unwrap();

        let mut storer = p.create_storer();
        let ids = storer.store_all(&[a.clone(), c.clone()]).unwrap();
        assert_eq!(storer.record_count(), 3);
        assert_eq!(storer.size(), 3);
        let summary = storer.commit().unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.new_types, 1);
        assert!(storer.is_empty());
        assert_eq!(channel.len(), 3);

        let q = reopen(&channel);
        let a2 = q.get(ids[0]).unwrap();
        let c2 = q.get(ids[1]).unwrap();
        let via_a = a2.get_ref("next").unwrap().unwrap();
        let via_c = c2.get_ref("next").unwrap().unwrap();
        assert!(via_a.ptr_eq(&via_c));
        assert_eq!(q.object_id(&via_a), p.object_id(&shared));
    }

    #[test]
    fn lazy_skips_known_references_and_eager_rewrites_them() {
        let (p, _channel) = memory_persistence();
        let b = node(&p, "b");
        let a = node(&p, "a");
        a.set("next", b.clone()).unwrap();
        p.store(&a).unwrap();

        b.set("name", "b2").unwrap();
        let mut lazy = p.create_storer();
        lazy.store(&a).unwrap();
        assert_eq!(lazy.record_count(), 1);
        assert_eq!(lazy.commit().unwrap().records, 1);

        let mut eager = p.create_eager_storer();
        assert_eq!(eager.mode(), StorerMode::Eager);
        eager.store(&a).unwrap();
        assert_eq!(eager.record_count(), 2);
        eager.commit().unwrap();
    }

    #[test]
    fn cycles_terminate() {
        let (p, channel) = memory_persistence();
        let selfish = node(&p, "self");
        selfish.set("next", selfish.clone()).unwrap();
        let mut storer = p.create_storer();
        let id = storer.store(&selfish).unwrap();
        assert_eq!(storer.record_count(), 1);
        storer.commit().unwrap();

        let a = node(&p, "a");
        let b = node(&p, "b");
        a.set("next", b.clone()).unwrap();
        b.set("next", a.clone()).unwrap();
        let mut storer = p.create_storer();
        storer.store(&a).unwrap();
        assert_eq!(storer.record_count(), 2);
        storer.commit().unwrap();

        let q = reopen(&channel);
        let loaded = q.get(id).unwrap();
        assert!(loaded.get_ref("next").unwrap().unwrap().ptr_eq(&loaded));
        let b2 = q.get(p.object_id(&b).unwrap()).unwrap();
        let a2 = b2.get_ref("next").unwrap().unwrap();
        assert!(a2.get_ref("next").unwrap().unwrap().ptr_eq(&b2));
    }

    #[test]
    fn same_instance_keeps_its_id() {
        let (p, channel) = memory_persistence();
        let n = node(&p, "n");
        let first = p.store(&n).unwrap();
        let before = channel.record(first).unwrap();

        assert_eq!(p.store(&n).unwrap(), first);
        assert_eq!(channel.record(first).unwrap(), before);

        n.set("name", "renamed").unwrap();
        assert_eq!(p.store(&n).unwrap(), first);
        assert_ne!(channel.record(first).unwrap(), before);
        assert_eq!(channel.stats().commits, 3);
    }

    #[test]
    fn failed_write_binds_nothing() {
        let (p, channel) = memory_persistence();
        let n = node(&p, "n");
        channel.fail_next_write();
        let err = p.store(&n).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transfer);
        assert!(p.object_id(&n).is_none());
        assert!(channel.is_empty());
        assert!(channel.read_type_dictionary().unwrap().is_empty());

        let id = p.store(&n).unwrap();
        assert_eq!(reopen(&channel).get(id).unwrap().get("name").unwrap().as_text(), Some("n"));
    }

    #[test]
    fn sub_storers_commit_in_one_batch() {
        let (p, channel) = memory_persistence();
        let a = node(&p, "a");
        let b = node(&p, "b");
        let mut main = p.create_storer();
        let mut sub = p.create_storer();
        main.store(&a).unwrap();
        sub.store(&b).unwrap();
        main.register_sub_storer(sub).unwrap();

        let summary = main.commit().unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(channel.stats().commits, 1);
        assert!(p.object_id(&a).is_some());
        assert!(p.object_id(&b).is_some());
    }

    #[test]
    fn conflicting_sub_storer_aborts_the_whole_batch() {
        let (p, channel) = memory_persistence();
        let shared = node(&p, "shared");
        let other = node(&p, "other");
        let mut main = p.create_storer();
        let mut sub = p.create_storer();
        main.store(&shared).unwrap();
        main.store(&other).unwrap();
        sub.store(&shared).unwrap();
        main.register_sub_storer(sub).unwrap();

        let err = main.commit().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Consistency);
        assert!(channel.is_empty());
        assert!(p.object_id(&shared).is_none());
        assert!(p.object_id(&other).is_none());
        assert!(main.is_empty());
    }

    #[test]
    fn foreign_sub_storer_is_rejected() {
        let (p, _) = memory_persistence();
        let (q, _) = memory_persistence();
        let err = p
            .create_storer()
            .register_sub_storer(q.create_storer())
            .unwrap_err();
        assert!(matches!(err, EngineError::ForeignStorer));
        assert_eq!(err.category(), ErrorCategory::Usage);
    }

    #[test]
    fn skip_variants() {
        let (p, channel) = memory_persistence();
        let target = node(&p, "target");
        let target_id = p.store(&target).unwrap();

        let b = node(&p, "b");
        let a = node(&p, "a");
        a.set("next", b.clone()).unwrap();

        let mut storer = p.create_eager_storer();
        assert!(storer.skip_nulled(&b));
        assert!(!storer.skip_nulled(&b));
        let nulled = storer.store(&a).unwrap();
        assert_eq!(storer.record_count(), 1);
        storer.commit().unwrap();
        assert!(p.object_id(&b).is_none());

        let c = node(&p, "c");
        c.set("next", b.clone()).unwrap();
        let mut storer = p.create_storer();
        storer.skip_mapped(&b, target_id);
        let mapped = storer.store(&c).unwrap();
        storer.commit().unwrap();

        target.set("name", "changed").unwrap();
        let d = node(&p, "d");
        d.set("next", target.clone()).unwrap();
        let mut storer = p.create_eager_storer();
        assert!(storer.skip(&target));
        let kept = storer.store(&d).unwrap();
        assert_eq!(storer.record_count(), 1);
        storer.commit().unwrap();

        let q = reopen(&channel);
        assert!(q.get(nulled).unwrap().get_ref("next").unwrap().is_none());
        let via_mapped = q.get(mapped).unwrap().get_ref("next").unwrap().unwrap();
        assert_eq!(q.object_id(&via_mapped), Some(target_id));
        let via_kept = q.get(kept).unwrap().get_ref("next").unwrap().unwrap();
        assert_eq!(via_kept.get("name").unwrap().as_text(), Some("target"));
    }

    #[test]
    fn batch_capacity_is_enforced() {
        let mut config = PersistenceConfig::default();
        config.storer.max_batch_bytes = 10;
        let p = Persistence::builder()
            .config(config)
            .register_type(node_type())
            .build()
            .unwrap();
        let n = node(&p, "far too long for ten bytes");
        let mut storer = p.create_storer();
        assert_eq!(storer.maximum_capacity(), 10);
        let err = storer.store(&n).unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { maximum: 10, .. }));
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert!(storer.is_empty());
        assert_eq!(storer.byte_len(), 0);
    }

    #[test]
    fn listeners_see_every_commit() {
        let (p, _) = memory_persistence();
        let listener = Arc::new(RecordingListener::default());
        let mut storer = p.create_storer();
        storer.register_commit_listener(listener.clone());

        storer.store(&node(&p, "one")).unwrap();
        storer.commit().unwrap();
        let two = node(&p, "two");
        two.set("next", node(&p, "three")).unwrap();
        storer.store(&two).unwrap();
        storer.commit().unwrap();

        let summaries = listener.summaries.lock().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].new_types, 1);
        assert_eq!(summaries[1].records, 2);
        assert_eq!(summaries[1].new_types, 0);
    }

    #[test]
    fn reloaded_graph_is_stored_byte_identical() {
        let (p, channel) = memory_persistence();
        let a = node(&p, "a");
        let b = node(&p, "b");
        a.set("next", b.clone()).unwrap();
        b.set("next", a.clone()).unwrap();
        let points = ObjRef::hash_set([point(&p, 1, 2), point(&p, 3, 4)]).unwrap();
        let list = ObjRef::list(vec![Some(a), None, Some(points)]);
        let root = p.store(&list).unwrap();
        let before = channel.read_all().unwrap();
        assert_eq!(before.len(), 6);

        let q = reopen(&channel);
        let loaded = q.get(root).unwrap();
        let mut storer = q.create_eager_storer();
        assert_eq!(storer.store(&loaded).unwrap(), root);
        assert_eq!(storer.record_count(), before.len());
        let summary = storer.commit().unwrap();
        assert_eq!(summary.new_types, 0);
        assert_eq!(channel.read_all().unwrap(), before);
    }

    #[test]
    fn explicit_id_conflicting_with_the_bound_id_fails_the_commit() {
        let (p, channel) = memory_persistence();
        let n = node(&p, "n");
        let bound = p.store(&n).unwrap();
        let other = ObjectId::from_raw(bound.as_u64() + 50);

        let mut storer = p.create_storer();
        assert_eq!(storer.store_with_id(&n, other).unwrap(), other);
        let err = storer.commit().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Consistency);
        assert_eq!(p.object_id(&n), Some(bound));
        assert!(channel.record(other).is_none());
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.stats().commits, 1);
    }

    #[test]
    fn merged_sub_storer_batches_respect_capacity() {
        let single = {
            let (p, _) = memory_persistence();
            let mut storer = p.create_storer();
            storer.store(&node(&p, "a")).unwrap();
            storer.byte_len()
        };
        let mut config = PersistenceConfig::default();
        config.storer.max_batch_bytes = single * 3 / 2;
        let p = Persistence::builder()
            .config(config)
            .register_type(node_type())
            .build()
            .unwrap();

        let a = node(&p, "a");
        let b = node(&p, "b");
        let mut main = p.create_storer();
        let mut sub = p.create_storer();
        main.store(&a).unwrap();
        sub.store(&b).unwrap();
        main.register_sub_storer(sub).unwrap();

        let err = main.commit().unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { requested, .. } if requested == 2 * single));
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert!(main.is_empty());
        assert!(p.object_id(&a).is_none());
        assert!(p.object_id(&b).is_none());
    }
}
