//! Resolver and lookup doubles for handler tests.

use std::collections::HashMap;

use objgraph_model::ObjRef;
use objgraph_types::{ObjectId, DEFAULT_START_OBJECT_ID};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{ObjectLookup, ReferenceResolver};

/// Assigns sequential ids by identity.
#[derive(Default)]
pub(crate) struct CountingResolver {
    ids: HashMap<usize, ObjectId>,
    pub(crate) resolved: Vec<ObjRef>,
}

impl CountingResolver {
    pub(crate) fn id_of(&self, object: &ObjRef) -> Option<ObjectId> {
        self.ids.get(&object.identity()).copied()
    }
}

impl ReferenceResolver for CountingResolver {
    fn resolve(&mut self, object: &ObjRef) -> HandlerResult<ObjectId> {
        if let Some(id) = self.id_of(object) {
            return Ok(id);
        }
        let id = ObjectId::from_raw(DEFAULT_START_OBJECT_ID + self.ids.len() as u64);
        self.ids.insert(object.identity(), id);
        self.resolved.push(object.clone());
        Ok(id)
    }
}

/// Fixed id to instance table.
#[derive(Default)]
pub(crate) struct MapLookup {
    objects: HashMap<ObjectId, ObjRef>,
}

impl MapLookup {
    pub(crate) fn with(mut self, id: ObjectId, object: ObjRef) -> Self {
        self.objects.insert(id, object);
        self
    }
}

impl ObjectLookup for MapLookup {
    fn lookup_reference(&self, from: ObjectId, object_id: ObjectId) -> HandlerResult<Option<ObjRef>> {
        if object_id.is_null() {
            return Ok(None);
        }
        self.objects
            .get(&object_id)
            .cloned()
            .map(Some)
            .ok_or(HandlerError::DanglingReference {
                from,
                to: object_id,
            })
    }
}
