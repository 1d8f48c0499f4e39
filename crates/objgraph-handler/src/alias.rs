use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::TypeDefinition;
use objgraph_model::{ObjRef, RuntimeType};
use objgraph_types::{ObjectId, TypeId};

use crate::error::HandlerResult;
use crate::handler::{ObjectLookup, ReferenceResolver, TypeHandler};

/// Reads records of a stored definition whose layout is identical to the
/// current one but that was assigned a different type id.
#[derive(Clone)]
pub struct AliasHandler {
    definition: Arc<TypeDefinition>,
    current: Arc<dyn TypeHandler>,
}

impl AliasHandler {
    pub fn new(definition: Arc<TypeDefinition>, current: Arc<dyn TypeHandler>) -> Self {
        Self {
            definition,
            current,
        }
    }

    pub fn current(&self) -> &Arc<dyn TypeHandler> {
        &self.current
    }
}

impl TypeHandler for AliasHandler {
    fn type_id(&self) -> TypeId {
        self.definition.type_id
    }

    fn definition(&self) -> &Arc<TypeDefinition> {
        &self.definition
    }

    fn runtime_type(&self) -> &Arc<RuntimeType> {
        self.current.runtime_type()
    }

    fn store(
        &self,
        writer: &mut RecordWriter,
        instance: &ObjRef,
        resolver: &mut dyn ReferenceResolver,
    ) -> HandlerResult<()> {
        self.current.store(writer, instance, resolver)
    }

    fn iterate_references(&self, instance: &ObjRef, visit: &mut dyn FnMut(&ObjRef)) {
        self.current.iterate_references(instance, visit)
    }

    fn iterate_persisted_references(
        &self,
        record: &BinaryRecord,
        visit: &mut dyn FnMut(ObjectId),
    ) -> HandlerResult<()> {
        self.current.iterate_persisted_references(record, visit)
    }

    fn create(&self, record: &BinaryRecord) -> HandlerResult<ObjRef> {
        self.current.create(record)
    }

    fn populate(
        &self,
        record: &BinaryRecord,
        instance: &ObjRef,
        lookup: &dyn ObjectLookup,
    ) -> HandlerResult<()> {
        self.current.populate(record, instance, lookup)
    }

    fn complete(&self, instance: &ObjRef) -> HandlerResult<()> {
        self.current.complete(instance)
    }

    fn resolves_constants(&self) -> bool {
        self.current.resolves_constants()
    }

    fn constant(&self, name: &str) -> Option<ObjRef> {
        self.current.constant(name)
    }
}

impl std::fmt::Debug for AliasHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasHandler")
            .field("type_id", &self.definition.type_id)
            .field("current", &self.current.type_id())
            .finish()
    }
}
