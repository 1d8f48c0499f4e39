use std::fmt;
use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::{MemberKind, TypeDefinition};
use objgraph_handler::codec::{self, RawValue};
use objgraph_handler::{
    HandlerError, HandlerResult, ObjectLookup, ReferenceResolver, TypeHandler,
};
use objgraph_model::{ObjRef, ObjectBody, RuntimeType, Value};
use objgraph_types::{ObjectId, TypeId};

use crate::mapping::LegacyTypeMapping;
use crate::similarity::convert;

fn mismatch(old: &TypeDefinition, current: &dyn TypeHandler, reason: String) -> HandlerError {
    HandlerError::SchemaMismatch {
        type_name: current.type_name().to_string(),
        old_type_id: old.type_id,
        current_type_id: current.type_id(),
        reason,
    }
}

/// Reads records of an old record definition into current-shape instances.
///
/// Storing always goes through the current handler; this handler only
/// translates on load.
pub struct LegacyTypeHandler {
    mapping: LegacyTypeMapping,
    current: Arc<dyn TypeHandler>,
    /// Runtime member index and current kind fed by each old member.
    targets: Vec<Option<(usize, MemberKind)>>,
}

impl LegacyTypeHandler {
    pub fn new(mapping: LegacyTypeMapping, current: Arc<dyn TypeHandler>) -> HandlerResult<Self> {
        let runtime = current.runtime_type();
        let targets = mapping
            .old_targets()
            .into_iter()
            .map(|target| {
                let Some(current_index) = target else {
                    return Ok(None);
                };
                let member = &mapping.current.members[current_index];
                let identifier = member.identifier();
                runtime
                    .members()
                    .iter()
                    .position(|d| d.identifier() == identifier)
                    .map(|runtime_index| Some((runtime_index, member.kind.clone())))
                    .ok_or_else(|| {
                        mismatch(
                            &mapping.old,
                            current.as_ref(),
                            format!("runtime type has no member {identifier}"),
                        )
                    })
            })
            .collect::<HandlerResult<Vec<_>>>()?;
        Ok(Self {
            mapping,
            current,
            targets,
        })
    }

    pub fn mapping(&self) -> &LegacyTypeMapping {
        &self.mapping
    }
}

impl TypeHandler for LegacyTypeHandler {
    fn type_id(&self) -> TypeId {
        self.mapping.old.type_id
    }

    fn definition(&self) -> &Arc<TypeDefinition> {
        &self.mapping.old
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
        let mut reader = record.reader();
        for (member, target) in self.mapping.old.members.iter().zip(&self.targets) {
            match (&member.kind, target) {
                (MemberKind::Reference(_), Some(_)) => {
                    let id = reader.read_object_id()?;
                    if !id.is_null() {
                        visit(id);
                    }
                }
                (kind, _) => codec::skip_member(&mut reader, kind)?,
            }
        }
        Ok(())
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
        let runtime = self.current.runtime_type();
        let mut values: Vec<Value> = runtime
            .members()
            .iter()
            .map(|m| Value::default_for(&m.member_type))
            .collect();
        let old = &self.mapping.old;
        let mut reader = record.reader();
        for (member, target) in old.members.iter().zip(&self.targets) {
            let Some((runtime_index, kind)) = target else {
                codec::skip_member(&mut reader, &member.kind)?;
                continue;
            };
            let value = match codec::read_member(&mut reader, &old.type_name, member)? {
                RawValue::Value(v) => v,
                RawValue::Reference(id) => lookup.lookup_reference(record.object_id, id)?.into(),
            };
            values[*runtime_index] =
                convert(value, kind).ok_or_else(|| HandlerError::ValueMismatch {
                    type_name: runtime.name().to_string(),
                    member: member.identifier(),
                    found: kind.token().to_string(),
                })?;
        }
        reader.finish()?;
        *instance.write() = ObjectBody::Record(values);
        Ok(())
    }

    fn complete(&self, instance: &ObjRef) -> HandlerResult<()> {
        self.current.complete(instance)
    }

    fn is_legacy(&self) -> bool {
        true
    }
}

impl fmt::Debug for LegacyTypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyTypeHandler")
            .field("old_type_id", &self.mapping.old.type_id)
            .field("current_type_id", &self.current.type_id())
            .field("discarded", &self.mapping.discarded.len())
            .finish()
    }
}

/// Reads records of an old enum definition, mapping ordinals by constant name.
pub struct LegacyEnumHandler {
    old: Arc<TypeDefinition>,
    current: Arc<dyn TypeHandler>,
    /// Current ordinal for each old ordinal, `None` for dropped constants.
    ordinals: Vec<Option<u32>>,
}

impl LegacyEnumHandler {
    pub fn new(
        old: Arc<TypeDefinition>,
        current: Arc<dyn TypeHandler>,
        ordinals: Vec<Option<u32>>,
    ) -> Self {
        Self {
            old,
            current,
            ordinals,
        }
    }

    /// Current ordinal for an old ordinal.
    pub fn map_ordinal(&self, old_ordinal: u32) -> HandlerResult<u32> {
        match self.ordinals.get(old_ordinal as usize) {
            Some(Some(ordinal)) => Ok(*ordinal),
            Some(None) => {
                let constants = self.old.enum_constants();
                Err(mismatch(
                    &self.old,
                    self.current.as_ref(),
                    format!(
                        "stored constant {} has no current counterpart",
                        constants[old_ordinal as usize]
                    ),
                ))
            }
            None => Err(HandlerError::InvalidOrdinal {
                type_name: self.old.type_name.clone(),
                ordinal: old_ordinal,
            }),
        }
    }
}

impl TypeHandler for LegacyEnumHandler {
    fn type_id(&self) -> TypeId {
        self.old.type_id
    }

    fn definition(&self) -> &Arc<TypeDefinition> {
        &self.old
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

    fn iterate_references(&self, _instance: &ObjRef, _visit: &mut dyn FnMut(&ObjRef)) {}

    fn iterate_persisted_references(
        &self,
        _record: &BinaryRecord,
        _visit: &mut dyn FnMut(ObjectId),
    ) -> HandlerResult<()> {
        Ok(())
    }

    fn create(&self, record: &BinaryRecord) -> HandlerResult<ObjRef> {
        let mut reader = record.reader();
        let ordinal = self.map_ordinal(reader.read_u32()?)?;
        reader.finish()?;
        let runtime = self.current.runtime_type();
        runtime
            .constants()
            .get(ordinal as usize)
            .and_then(|name| self.current.constant(name))
            .ok_or_else(|| HandlerError::InvalidOrdinal {
                type_name: runtime.name().to_string(),
                ordinal,
            })
    }

    fn populate(
        &self,
        _record: &BinaryRecord,
        _instance: &ObjRef,
        _lookup: &dyn ObjectLookup,
    ) -> HandlerResult<()> {
        Ok(())
    }

    fn resolves_constants(&self) -> bool {
        true
    }

    fn constant(&self, name: &str) -> Option<ObjRef> {
        self.current.constant(name)
    }

    fn is_legacy(&self) -> bool {
        true
    }
}

impl fmt::Debug for LegacyEnumHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyEnumHandler")
            .field("old_type_id", &self.old.type_id)
            .field("current_type_id", &self.current.type_id())
            .field("ordinals", &self.ordinals)
            .finish()
    }
}
