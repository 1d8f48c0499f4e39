use std::fmt;
use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::{TypeDefinition, TypeMember};
use objgraph_model::{ModelError, ObjRef, ObjectBody, RuntimeType, Value};
use objgraph_types::{ObjectId, TypeId};

use crate::codec::{self, RawValue};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{ObjectLookup, ReferenceResolver, TypeHandler};

/// Persisted members of a record type: fixed-length members first, then
/// variable-length members, each group in declaration order.
pub fn record_members(runtime: &RuntimeType) -> Vec<TypeMember> {
    persisted_order(runtime)
        .into_iter()
        .map(|i| TypeMember::from_descriptor(&runtime.members()[i]))
        .collect()
}

/// Runtime member indices in persisted order.
fn persisted_order(runtime: &RuntimeType) -> Vec<usize> {
    let members = runtime.members();
    let fixed = (0..members.len()).filter(|&i| members[i].member_type.is_fixed_length());
    let variable = (0..members.len()).filter(|&i| !members[i].member_type.is_fixed_length());
    fixed.chain(variable).collect()
}

/// Handler generated from a record type's declared members.
pub struct ReflectiveHandler {
    definition: Arc<TypeDefinition>,
    runtime: Arc<RuntimeType>,
    /// Runtime member index of each definition member.
    layout: Vec<usize>,
}

impl ReflectiveHandler {
    pub fn new(definition: Arc<TypeDefinition>, runtime: Arc<RuntimeType>) -> Self {
        let layout = persisted_order(&runtime);
        Self {
            definition,
            runtime,
            layout,
        }
    }

    fn values(&self, instance: &ObjRef) -> HandlerResult<Vec<Value>> {
        match &*instance.read() {
            ObjectBody::Record(values) if values.len() == self.layout.len() => Ok(values.clone()),
            _ => Err(HandlerError::Model(ModelError::ShapeMismatch {
                type_name: self.runtime.name().to_string(),
                expected: "record",
            })),
        }
    }
}

impl TypeHandler for ReflectiveHandler {
    fn type_id(&self) -> TypeId {
        self.definition.type_id
    }

    fn definition(&self) -> &Arc<TypeDefinition> {
        &self.definition
    }

    fn runtime_type(&self) -> &Arc<RuntimeType> {
        &self.runtime
    }

    fn store(
        &self,
        writer: &mut RecordWriter,
        instance: &ObjRef,
        resolver: &mut dyn ReferenceResolver,
    ) -> HandlerResult<()> {
        // Snapshot first: resolving a reference may read this same instance.
        let values = self.values(instance)?;
        for (member, &index) in self.definition.members.iter().zip(&self.layout) {
            codec::write_member(writer, self.type_name(), member, &values[index], resolver)?;
        }
        Ok(())
    }

    fn iterate_references(&self, instance: &ObjRef, visit: &mut dyn FnMut(&ObjRef)) {
        let Ok(values) = self.values(instance) else {
            return;
        };
        for value in &values {
            if let Some(target) = value.as_ref() {
                visit(target);
            }
        }
    }

    fn iterate_persisted_references(
        &self,
        record: &BinaryRecord,
        visit: &mut dyn FnMut(ObjectId),
    ) -> HandlerResult<()> {
        let mut reader = record.reader();
        codec::visit_member_references(&mut reader, &self.definition.members, visit)
    }

    fn create(&self, _record: &BinaryRecord) -> HandlerResult<ObjRef> {
        Ok(ObjRef::blank(Arc::clone(&self.runtime)))
    }

    fn populate(
        &self,
        record: &BinaryRecord,
        instance: &ObjRef,
        lookup: &dyn ObjectLookup,
    ) -> HandlerResult<()> {
        let mut values: Vec<Value> = self
            .runtime
            .members()
            .iter()
            .map(|m| Value::default_for(&m.member_type))
            .collect();
        let mut reader = record.reader();
        for (member, &index) in self.definition.members.iter().zip(&self.layout) {
            values[index] = match codec::read_member(&mut reader, self.type_name(), member)? {
                RawValue::Value(v) => v,
                RawValue::Reference(id) => lookup.lookup_reference(record.object_id, id)?.into(),
            };
        }
        reader.finish()?;
        *instance.write() = ObjectBody::Record(values);
        Ok(())
    }
}

impl fmt::Debug for ReflectiveHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectiveHandler")
            .field("type_id", &self.definition.type_id)
            .field("type_name", &self.definition.type_name)
            .field("members", &self.layout.len())
            .finish()
    }
}
