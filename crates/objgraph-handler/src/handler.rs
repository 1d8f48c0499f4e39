use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::TypeDefinition;
use objgraph_model::{ObjRef, RuntimeType};
use objgraph_types::{ObjectId, TypeId};

use crate::error::HandlerResult;

/// Store-side callback: turns a referenced instance into an object id.
///
/// The storer implements this. Resolving an instance it has not seen yet
/// assigns it an id and queues it for storing.
pub trait ReferenceResolver {
    fn resolve(&mut self, object: &ObjRef) -> HandlerResult<ObjectId>;
}

/// Load-side callback: turns a referenced object id into an instance.
///
/// The loader implements this. Every id reported by
/// [`TypeHandler::iterate_persisted_references`] has been created before
/// population starts, so an unknown non-null id is a dangling reference.
pub trait ObjectLookup {
    /// Instance for `object_id`; `Ok(None)` for the null id.
    fn lookup_reference(&self, from: ObjectId, object_id: ObjectId) -> HandlerResult<Option<ObjRef>>;
}

/// Strategy that moves instances of one runtime type in and out of binary
/// records.
///
/// A handler is bound to one type id for its whole life and holds no
/// per-instance state. Loading runs in three phases so cyclic graphs
/// resolve: every instance is [`create`](Self::create)d and registered
/// first, then [`populate`](Self::populate)d, then
/// [`complete`](Self::complete)d once every referenced instance is populated.
pub trait TypeHandler: Send + Sync {
    /// Type id this handler reads and writes.
    fn type_id(&self) -> TypeId;

    /// Persisted layout of this handler's records.
    fn definition(&self) -> &Arc<TypeDefinition>;

    /// Runtime type of the instances this handler creates.
    fn runtime_type(&self) -> &Arc<RuntimeType>;

    fn type_name(&self) -> &str {
        &self.definition().type_name
    }

    /// Write the state of `instance`, resolving every reference through `resolver`.
    fn store(
        &self,
        writer: &mut RecordWriter,
        instance: &ObjRef,
        resolver: &mut dyn ReferenceResolver,
    ) -> HandlerResult<()>;

    /// Report every non-null instance `instance` references.
    fn iterate_references(&self, instance: &ObjRef, visit: &mut dyn FnMut(&ObjRef));

    /// Report every non-null object id a record references.
    fn iterate_persisted_references(
        &self,
        record: &BinaryRecord,
        visit: &mut dyn FnMut(ObjectId),
    ) -> HandlerResult<()>;

    /// Allocate a blank instance for a record. No member is populated yet.
    fn create(&self, record: &BinaryRecord) -> HandlerResult<ObjRef>;

    /// Fill `instance` from the record.
    fn populate(
        &self,
        record: &BinaryRecord,
        instance: &ObjRef,
        lookup: &dyn ObjectLookup,
    ) -> HandlerResult<()>;

    /// Fix-ups that need every referenced instance populated, such as
    /// rehashing containers.
    fn complete(&self, _instance: &ObjRef) -> HandlerResult<()> {
        Ok(())
    }

    /// Returns `true` if [`create`](Self::create) returns shared constants
    /// instead of fresh instances.
    fn resolves_constants(&self) -> bool {
        false
    }

    /// Enum constant with this name, for enum handlers.
    fn constant(&self, _name: &str) -> Option<ObjRef> {
        None
    }

    /// Returns `true` for handlers that translate an older type definition.
    fn is_legacy(&self) -> bool {
        false
    }
}

/// Builds handlers for stored definitions that differ from the runtime shape.
///
/// Implemented by the legacy type resolver and installed into the
/// [`TypeHandlerRegistry`](crate::TypeHandlerRegistry).
pub trait LegacyTypeHandlerCreator: Send + Sync {
    /// Current type name for a stored type name that no runtime type uses,
    /// typically from a refactoring mapping.
    fn resolve_type_name(&self, old: &TypeDefinition) -> HandlerResult<Option<String>>;

    /// Handler that reads records of `old` into instances of `current`'s type.
    fn create_legacy_handler(
        &self,
        old: Arc<TypeDefinition>,
        current: Arc<dyn TypeHandler>,
    ) -> HandlerResult<Arc<dyn TypeHandler>>;
}
