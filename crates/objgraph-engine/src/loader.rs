use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use objgraph_binary::BinaryRecord;
use objgraph_handler::{HandlerError, HandlerResult, ObjectLookup, TypeHandler};
use objgraph_model::ObjRef;
use objgraph_types::ObjectId;
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};

/// Materializes stored objects and everything they reference.
///
/// Instances already bound in the object registry are returned as they are.
/// Everything else is loaded in three phases:
///
/// 1. **create**: a blank instance per record, kept in the load's own table
///    so references inside a cycle resolve to it
/// 2. **populate**: members are read and references looked up
/// 3. **complete**: fix-ups such as rehashing sets and maps, once every
///    instance of the load is populated
///
/// Only then are the new instances bound in the registry, all at once, so no
/// other caller ever sees one half-built. If a concurrent load bound any of
/// the same ids first, the load is discarded and repeated against the
/// instances that won. A failure in any phase binds nothing.
pub struct Loader {
    ctx: Arc<EngineContext>,
}

impl Loader {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn get(&self, object_id: ObjectId) -> EngineResult<ObjRef> {
        self.get_all(&[object_id])?
            .into_iter()
            .next()
            .ok_or(EngineError::ObjectNotFound(object_id))
    }

    /// Load `object_id` and check that it is a `type_name`. On a mismatch
    /// nothing the load created is bound.
    pub fn get_typed(&self, object_id: ObjectId, type_name: &str) -> EngineResult<ObjRef> {
        self.load(&[object_id], Some(type_name))?
            .into_iter()
            .next()
            .ok_or(EngineError::ObjectNotFound(object_id))
    }

    /// Load several objects in one pass, in the order requested.
    pub fn get_all(&self, object_ids: &[ObjectId]) -> EngineResult<Vec<ObjRef>> {
        self.load(object_ids, None)
    }

    fn load(&self, object_ids: &[ObjectId], expected: Option<&str>) -> EngineResult<Vec<ObjRef>> {
        let mut attempt = 1u32;
        loop {
            let mut session = LoadSession::new(&self.ctx);
            if let Err(e) = session.load(object_ids) {
                warn!(error = %e, created = session.fresh.len(), "load aborted");
                return Err(e);
            }
            let instances = object_ids
                .iter()
                .map(|id| session.resolve(*id).ok_or(EngineError::ObjectNotFound(*id)))
                .collect::<EngineResult<Vec<_>>>()?;
            if let Some(expected) = expected {
                check_types(object_ids, &instances, expected)?;
            }

            let taken = self.ctx.objects.register_all_if_absent(&session.fresh)?;
            if taken.is_empty() {
                return Ok(instances);
            }
            debug!(
                attempt,
                taken = taken.len(),
                "objects bound by a concurrent load, loading again"
            );
            attempt += 1;
        }
    }
}

fn check_types(object_ids: &[ObjectId], instances: &[ObjRef], expected: &str) -> EngineResult<()> {
    for (object_id, instance) in object_ids.iter().zip(instances) {
        if instance.type_name() != expected {
            return Err(EngineError::TypeMismatch {
                object_id: *object_id,
                expected: expected.to_string(),
                found: instance.type_name().to_string(),
            });
        }
    }
    Ok(())
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("registry", &self.ctx.objects.len())
            .finish()
    }
}

/// State of one load request.
struct LoadSession<'a> {
    ctx: &'a EngineContext,
    /// Every instance this load resolved by id: already bound ones, locally
    /// aliased enum constants and the ones it created.
    created: HashMap<ObjectId, ObjRef>,
    /// Instances this load created, bound only once all of them are complete.
    fresh: Vec<(ObjectId, ObjRef)>,
    /// Created instances awaiting population, in creation order.
    pending: Vec<(BinaryRecord, Arc<dyn TypeHandler>, ObjRef)>,
}

impl<'a> LoadSession<'a> {
    fn new(ctx: &'a EngineContext) -> Self {
        Self {
            ctx,
            created: HashMap::new(),
            fresh: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn resolve(&self, object_id: ObjectId) -> Option<ObjRef> {
        self.created
            .get(&object_id)
            .cloned()
            .or_else(|| self.ctx.objects.lookup_object(object_id))
    }

    /// Returns `true` if the id needs no record. Bound instances are held for
    /// the rest of the load.
    fn is_known(&mut self, object_id: ObjectId) -> bool {
        if self.created.contains_key(&object_id) {
            return true;
        }
        match self.ctx.objects.lookup_object(object_id) {
            Some(live) => {
                self.created.insert(object_id, live);
                true
            }
            None => false,
        }
    }

    fn load(&mut self, object_ids: &[ObjectId]) -> EngineResult<()> {
        let mut frontier: Vec<ObjectId> = Vec::new();
        let mut seen = HashSet::new();
        for id in object_ids {
            if !id.is_null() && !self.is_known(*id) && seen.insert(*id) {
                frontier.push(*id);
            }
        }

        while !frontier.is_empty() {
            let records = self.ctx.channel.read_by_object_ids(&frontier)?;
            let mut next = Vec::new();
            for record in records {
                for id in self.create(record)? {
                    if !self.is_known(id) && seen.insert(id) {
                        next.push(id);
                    }
                }
            }
            frontier = next;
        }
        debug!(created = self.fresh.len(), "load create phase done");

        let lookup: &dyn ObjectLookup = &*self;
        for (record, handler, instance) in &self.pending {
            handler.populate(record, instance, lookup)?;
        }
        for (_, handler, instance) in &self.pending {
            handler.complete(instance)?;
        }
        debug!(populated = self.pending.len(), "load complete");
        Ok(())
    }

    /// Create the instance of one record. Returns the ids it references.
    fn create(&mut self, record: BinaryRecord) -> EngineResult<Vec<ObjectId>> {
        let object_id = record.object_id;
        let handler = self.ctx.handlers.handler_for_type_id(record.type_id)?;
        let instance = handler.create(&record)?;

        if handler.resolves_constants() {
            // Constants are whole from the start and stay bound even if the
            // rest of the load fails.
            match self.ctx.objects.lookup_object_id(&instance) {
                Some(existing) if existing != object_id => {
                    debug!(
                        object_id = %object_id,
                        registered = %existing,
                        type_name = %handler.type_name(),
                        "enum constant aliased"
                    );
                }
                Some(_) => {}
                None => self.ctx.objects.register_guaranteed(object_id, &instance)?,
            }
            self.created.insert(object_id, instance);
            return Ok(Vec::new());
        }

        let mut references = Vec::new();
        handler.iterate_persisted_references(&record, &mut |id| references.push(id))?;
        self.created.insert(object_id, instance.clone());
        self.fresh.push((object_id, instance.clone()));
        self.pending.push((record, handler, instance));
        Ok(references)
    }
}

impl ObjectLookup for LoadSession<'_> {
    fn lookup_reference(&self, from: ObjectId, object_id: ObjectId) -> HandlerResult<Option<ObjRef>> {
        if object_id.is_null() {
            return Ok(None);
        }
        self.resolve(object_id)
            .map(Some)
            .ok_or(HandlerError::DanglingReference { from, to: object_id })
    }
}
