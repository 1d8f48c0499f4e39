use std::collections::HashMap;
use std::sync::RwLock;

use objgraph_model::{ObjRef, WeakObjRef};
use objgraph_types::ObjectId;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// Bidirectional map between live instances and persistent object ids.
///
/// The registry is the only authority on whether an instance has been seen
/// before. Entries hold instances weakly: once the application drops an
/// instance its entry is dead, and the id may only be bound again by loading
/// the same persisted object. A weak entry keeps the instance's allocation
/// reserved, so a dead entry's identity is never handed to a new instance.
///
/// Reads take a shared lock. Every mutation takes the exclusive lock, which
/// serializes id assignment across storers and loaders.
pub struct ObjectRegistry {
    inner: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    by_id: HashMap<ObjectId, Entry>,
    by_identity: HashMap<usize, ObjectId>,
}

struct Entry {
    object: WeakObjRef,
    identity: usize,
}

impl RegistryState {
    fn live(&self, object_id: ObjectId) -> Option<ObjRef> {
        self.by_id.get(&object_id)?.object.upgrade()
    }

    fn id_of(&self, object: &ObjRef) -> Option<ObjectId> {
        let id = *self.by_identity.get(&object.identity())?;
        let live = self.live(id)?;
        live.ptr_eq(object).then_some(id)
    }

    fn check(&self, object_id: ObjectId, object: &ObjRef) -> RegistryResult<()> {
        if object_id.is_null() {
            return Err(RegistryError::NullObjectId);
        }
        if let Some(existing) = self.id_of(object) {
            if existing != object_id {
                return Err(RegistryError::IdentityConflict {
                    type_name: object.type_name().to_string(),
                    existing,
                    requested: object_id,
                });
            }
        }
        if let Some(live) = self.live(object_id) {
            if !live.ptr_eq(object) {
                return Err(RegistryError::AliasConflict {
                    object_id,
                    existing_type: live.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, object_id: ObjectId, object: &ObjRef) {
        let identity = object.identity();
        if let Some(previous) = self.by_id.insert(
            object_id,
            Entry {
                object: object.downgrade(),
                identity,
            },
        ) {
            if previous.identity != identity {
                self.by_identity.remove(&previous.identity);
            }
        }
        self.by_identity.insert(identity, object_id);
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryState::default()),
        }
    }

    /// Id of a registered live instance.
    pub fn lookup_object_id(&self, object: &ObjRef) -> Option<ObjectId> {
        self.inner.read().expect("lock poisoned").id_of(object)
    }

    /// Live instance registered under `object_id`.
    pub fn lookup_object(&self, object_id: ObjectId) -> Option<ObjRef> {
        self.inner.read().expect("lock poisoned").live(object_id)
    }

    /// Returns `true` if a live instance is registered under `object_id`.
    pub fn contains_id(&self, object_id: ObjectId) -> bool {
        self.lookup_object(object_id).is_some()
    }

    /// Returns `true` if `object` is registered.
    pub fn contains_object(&self, object: &ObjRef) -> bool {
        self.lookup_object_id(object).is_some()
    }

    /// Bind `object_id` to `object`.
    ///
    /// Idempotent for an existing identical binding. Fails if the instance
    /// already has a different id, or the id belongs to another live instance.
    pub fn register_guaranteed(&self, object_id: ObjectId, object: &ObjRef) -> RegistryResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.check(object_id, object)?;
        state.insert(object_id, object);
        Ok(())
    }

    /// Bind `object_id` to `object` unless a live instance already holds the
    /// id, in which case that instance is returned instead.
    pub fn register_if_absent(&self, object_id: ObjectId, object: &ObjRef) -> RegistryResult<ObjRef> {
        let mut state = self.inner.write().expect("lock poisoned");
        if let Some(live) = state.live(object_id) {
            return Ok(live);
        }
        state.check(object_id, object)?;
        state.insert(object_id, object);
        Ok(object.clone())
    }

    /// Remove the binding of `object_id` if it still points at `object`.
    pub fn unregister(&self, object_id: ObjectId, object: &ObjRef) -> bool {
        let mut state = self.inner.write().expect("lock poisoned");
        let bound = state
            .by_id
            .get(&object_id)
            .is_some_and(|e| e.identity == object.identity());
        if bound {
            state.by_id.remove(&object_id);
            state.by_identity.remove(&object.identity());
        }
        bound
    }

    /// Check that every binding in `entries` could be registered, including
    /// against each other.
    pub fn validate(&self, entries: &[(ObjectId, ObjRef)]) -> RegistryResult<()> {
        let state = self.inner.read().expect("lock poisoned");
        Self::validate_batch(&state, entries)
    }

    fn validate_batch(state: &RegistryState, entries: &[(ObjectId, ObjRef)]) -> RegistryResult<()> {
        let mut ids: HashMap<ObjectId, &ObjRef> = HashMap::with_capacity(entries.len());
        let mut identities: HashMap<usize, ObjectId> = HashMap::with_capacity(entries.len());
        for (id, object) in entries {
            state.check(*id, object)?;
            if let Some(other) = ids.insert(*id, object) {
                if !other.ptr_eq(object) {
                    return Err(RegistryError::AliasConflict {
                        object_id: *id,
                        existing_type: other.type_name().to_string(),
                    });
                }
            }
            if let Some(existing) = identities.insert(object.identity(), *id) {
                if existing != *id {
                    return Err(RegistryError::IdentityConflict {
                        type_name: object.type_name().to_string(),
                        existing,
                        requested: *id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate `entries`, run `flush` and register the entries only if it
    /// succeeds. The exclusive lock is held throughout, so concurrent commits
    /// are serialized and no reader sees a binding whose data is not written.
    pub fn register_all_with<T, E>(
        &self,
        entries: &[(ObjectId, ObjRef)],
        flush: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RegistryError>,
    {
        let mut state = self.inner.write().expect("lock poisoned");
        Self::validate_batch(&state, entries)?;
        let result = flush()?;
        for (id, object) in entries {
            state.insert(*id, object);
        }
        debug!(entries = entries.len(), "registered committed objects");
        Ok(result)
    }

    /// Bind every entry, or none of them if another live instance already
    /// holds one of the ids.
    ///
    /// Returns the ids that were taken; the batch was registered if the list
    /// is empty.
    pub fn register_all_if_absent(&self, entries: &[(ObjectId, ObjRef)]) -> RegistryResult<Vec<ObjectId>> {
        let mut state = self.inner.write().expect("lock poisoned");
        let taken: Vec<ObjectId> = entries
            .iter()
            .filter(|(id, object)| state.live(*id).is_some_and(|live| !live.ptr_eq(object)))
            .map(|(id, _)| *id)
            .collect();
        if !taken.is_empty() {
            return Ok(taken);
        }
        Self::validate_batch(&state, entries)?;
        for (id, object) in entries {
            state.insert(*id, object);
        }
        Ok(taken)
    }

    /// Drop entries whose instances are gone. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut state = self.inner.write().expect("lock poisoned");
        let dead: Vec<(ObjectId, usize)> = state
            .by_id
            .iter()
            .filter(|(_, e)| e.object.is_dead())
            .map(|(id, e)| (*id, e.identity))
            .collect();
        for (id, identity) in &dead {
            state.by_id.remove(id);
            state.by_identity.remove(identity);
        }
        if !dead.is_empty() {
            debug!(removed = dead.len(), "registry cleanup");
        }
        dead.len()
    }

    /// Number of entries, live or dead.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_model::RuntimeType;
    use std::sync::Arc;
    use std::thread;

    fn id(n: u64) -> ObjectId {
        ObjectId::from_raw(1_000_000_000_000_000_000 + n)
    }

    fn node() -> ObjRef {
        ObjRef::blank(Arc::new(RuntimeType::record("app.Node", vec![])))
    }

    // ------------------------------------------------------------------
    // Lookup and registration
    // ------------------------------------------------------------------

    #[test]
    fn register_and_lookup_both_ways() {
        let reg = ObjectRegistry::new();
        let a = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        assert_eq!(reg.lookup_object_id(&a), Some(id(1)));
        assert!(reg.lookup_object(id(1)).unwrap().ptr_eq(&a));
        assert!(reg.contains_id(id(1)));
        assert!(reg.contains_object(&a));
        assert!(!reg.contains_object(&node()));
    }

    #[test]
    fn register_is_idempotent() {
        let reg = ObjectRegistry::new();
        let a = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        reg.register_guaranteed(id(1), &a).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn second_id_is_rejected() {
        let reg = ObjectRegistry::new();
        let a = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        let err = reg.register_guaranteed(id(2), &a).unwrap_err();
        assert!(matches!(err, RegistryError::IdentityConflict { .. }));
    }

    #[test]
    fn aliasing_is_rejected() {
        let reg = ObjectRegistry::new();
        let a = node();
        let b = node();
        reg.register_guaranteed(id(2), &a).unwrap();
        let err = reg.register_guaranteed(id(2), &b).unwrap_err();
        assert!(matches!(err, RegistryError::AliasConflict { .. }));
        assert_eq!(
            reg.register_guaranteed(ObjectId::NULL, &b),
            Err(RegistryError::NullObjectId)
        );
    }

    #[test]
    fn register_if_absent_prefers_live_instance() {
        let reg = ObjectRegistry::new();
        let a = node();
        let b = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        let winner = reg.register_if_absent(id(1), &b).unwrap();
        assert!(winner.ptr_eq(&a));
        assert!(!reg.contains_object(&b));
    }

    // ------------------------------------------------------------------
    // Weak entries
    // ------------------------------------------------------------------

    #[test]
    fn dropped_instances_free_their_id_for_reload() {
        let reg = ObjectRegistry::new();
        let a = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        drop(a);
        assert!(reg.lookup_object(id(1)).is_none());

        let reloaded = node();
        let bound = reg.register_if_absent(id(1), &reloaded).unwrap();
        assert!(bound.ptr_eq(&reloaded));
        assert_eq!(reg.lookup_object_id(&reloaded), Some(id(1)));
    }

    #[test]
    fn cleanup_removes_dead_entries() {
        let reg = ObjectRegistry::new();
        let keep = node();
        reg.register_guaranteed(id(1), &keep).unwrap();
        reg.register_guaranteed(id(2), &node()).unwrap();
        assert_eq!(reg.cleanup(), 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains_object(&keep));
    }

    #[test]
    fn unregister_only_matching_binding() {
        let reg = ObjectRegistry::new();
        let a = node();
        reg.register_guaranteed(id(1), &a).unwrap();
        assert!(!reg.unregister(id(1), &node()));
        assert!(reg.unregister(id(1), &a));
        assert!(!reg.contains_object(&a));
    }

    // ------------------------------------------------------------------
    // Batch registration
    // ------------------------------------------------------------------

    #[derive(Debug, PartialEq)]
    enum FlushError {
        Registry(RegistryError),
        Io,
    }

    impl From<RegistryError> for FlushError {
        fn from(e: RegistryError) -> Self {
            FlushError::Registry(e)
        }
    }

    #[test]
    fn batch_registers_only_after_flush() {
        let reg = ObjectRegistry::new();
        let a = node();
        let b = node();
        let entries = vec![(id(1), a.clone()), (id(2), b.clone())];

        let failed: Result<(), FlushError> = reg.register_all_with(&entries, || Err(FlushError::Io));
        assert_eq!(failed, Err(FlushError::Io));
        assert!(reg.is_empty());

        let written: Result<usize, FlushError> = reg.register_all_with(&entries, || Ok(2));
        assert_eq!(written, Ok(2));
        assert_eq!(reg.lookup_object_id(&b), Some(id(2)));
    }

    #[test]
    fn batch_rejects_internal_conflicts() {
        let reg = ObjectRegistry::new();
        let a = node();
        let entries = vec![(id(1), a.clone()), (id(2), a.clone())];
        let mut flushed = false;
        let result: Result<(), FlushError> = reg.register_all_with(&entries, || {
            flushed = true;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(FlushError::Registry(RegistryError::IdentityConflict { .. }))
        ));
        assert!(!flushed);
        assert!(reg.validate(&[(id(3), a)]).is_ok());
    }

    #[test]
    fn batch_if_absent_is_all_or_nothing() {
        let reg = ObjectRegistry::new();
        let a = node();
        let b = node();
        let other = node();
        reg.register_guaranteed(id(2), &other).unwrap();

        let taken = reg
            .register_all_if_absent(&[(id(1), a.clone()), (id(2), b.clone())])
            .unwrap();
        assert_eq!(taken, vec![id(2)]);
        assert!(!reg.contains_object(&a));
        assert!(reg.lookup_object(id(2)).unwrap().ptr_eq(&other));

        let taken = reg
            .register_all_if_absent(&[(id(1), a.clone()), (id(2), other.clone())])
            .unwrap();
        assert!(taken.is_empty());
        assert_eq!(reg.lookup_object_id(&a), Some(id(1)));
    }

    #[test]
    fn concurrent_registration() {
        let reg = Arc::new(ObjectRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    let objects: Vec<_> = (0..50).map(|_| node()).collect();
                    for (i, o) in objects.iter().enumerate() {
                        reg.register_guaranteed(id(t * 100 + i as u64), o).unwrap();
                    }
                    objects
                })
            })
            .collect();
        let kept: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert_eq!(reg.len(), 200);
        assert_eq!(kept.len(), 200);
    }
}
