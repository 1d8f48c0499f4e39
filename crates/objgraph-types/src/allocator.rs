use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TypeError;
use crate::id::{
    ObjectId, TypeId, CONSTANT_ID_BASE, DEFAULT_START_OBJECT_ID, DEFAULT_START_TYPE_ID,
};

/// Source of new object and type ids.
///
/// Allocation is monotonic: an id handed out once is never handed out again,
/// even if the instance or type it named is no longer referenced. Allocators
/// are passed explicitly to the components that need them so tests can inject
/// a deterministic one.
pub trait IdAllocator: Send + Sync {
    /// Allocate the next object id.
    fn next_object_id(&self) -> Result<ObjectId, TypeError>;

    /// Allocate the next type id.
    fn next_type_id(&self) -> Result<TypeId, TypeError>;

    /// The most recently allocated object id (or the last id before the start).
    fn current_object_id(&self) -> ObjectId;

    /// The most recently allocated type id.
    fn current_type_id(&self) -> TypeId;

    /// Make sure future object ids are strictly greater than `highest`.
    fn advance_object_id(&self, highest: ObjectId);

    /// Make sure future type ids are strictly greater than `highest`.
    fn advance_type_id(&self, highest: TypeId);
}

/// Atomic, monotonically increasing id allocator.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    object: AtomicU64,
    type_: AtomicU64,
}

impl SequentialIdAllocator {
    /// Allocator starting at the default id ranges.
    pub fn new() -> Self {
        Self::starting_at(DEFAULT_START_OBJECT_ID, DEFAULT_START_TYPE_ID)
    }

    /// Allocator whose first ids are exactly `first_object` and `first_type`.
    pub fn starting_at(first_object: u64, first_type: u64) -> Self {
        Self {
            object: AtomicU64::new(first_object.saturating_sub(1)),
            type_: AtomicU64::new(first_type.saturating_sub(1)),
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn next_object_id(&self) -> Result<ObjectId, TypeError> {
        let previous = self
            .object
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current + 1;
                (next < CONSTANT_ID_BASE).then_some(next)
            })
            .map_err(TypeError::ObjectIdsExhausted)?;
        Ok(ObjectId::from_raw(previous + 1))
    }

    fn next_type_id(&self) -> Result<TypeId, TypeError> {
        let previous = self
            .type_
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(1).filter(|next| *next < DEFAULT_START_OBJECT_ID)
            })
            .map_err(TypeError::TypeIdsExhausted)?;
        Ok(TypeId::from_raw(previous + 1))
    }

    fn current_object_id(&self) -> ObjectId {
        ObjectId::from_raw(self.object.load(Ordering::SeqCst))
    }

    fn current_type_id(&self) -> TypeId {
        TypeId::from_raw(self.type_.load(Ordering::SeqCst))
    }

    fn advance_object_id(&self, highest: ObjectId) {
        // Constant ids live in their own range and never move the counter.
        if highest.is_constant() {
            return;
        }
        self.object.fetch_max(highest.as_u64(), Ordering::SeqCst);
    }

    fn advance_type_id(&self, highest: TypeId) {
        self.type_.fetch_max(highest.as_u64(), Ordering::SeqCst);
    }
}
