use std::fmt;
use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::{MemberKind, TypeDefinition, TypeMember};
use objgraph_model::{ObjRef, ObjectBody, RuntimeType};
use objgraph_types::{ObjectId, TypeId};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{ObjectLookup, ReferenceResolver, TypeHandler};

/// Persisted members of an enum: the ordinal, then one entry per constant.
///
/// The constant entries take no record bytes; they exist so a later version
/// can map ordinals by name.
pub fn enum_members(constants: &[String]) -> Vec<TypeMember> {
    std::iter::once(TypeMember::new("ordinal", MemberKind::Ordinal))
        .chain(
            constants
                .iter()
                .map(|name| TypeMember::new(name.clone(), MemberKind::EnumConstant)),
        )
        .collect()
}

/// Handler for enum types. Owns the process-wide constant instances.
pub struct EnumHandler {
    definition: Arc<TypeDefinition>,
    runtime: Arc<RuntimeType>,
    constants: Vec<ObjRef>,
}

impl EnumHandler {
    pub fn new(definition: Arc<TypeDefinition>, runtime: Arc<RuntimeType>) -> Self {
        let constants = (0..runtime.constants().len() as u32)
            .map(|ordinal| Self::constant_instance(&runtime, ordinal))
            .collect();
        Self {
            definition,
            runtime,
            constants,
        }
    }

    fn constant_instance(runtime: &Arc<RuntimeType>, ordinal: u32) -> ObjRef {
        let constant = ObjRef::blank(Arc::clone(runtime));
        *constant.write() = ObjectBody::Enum(ordinal);
        constant
    }

    /// Constant instances in ordinal order.
    pub fn constants(&self) -> &[ObjRef] {
        &self.constants
    }

    /// Constant with this ordinal.
    pub fn by_ordinal(&self, ordinal: u32) -> HandlerResult<ObjRef> {
        self.constants
            .get(ordinal as usize)
            .cloned()
            .ok_or_else(|| HandlerError::InvalidOrdinal {
                type_name: self.runtime.name().to_string(),
                ordinal,
            })
    }
}

impl TypeHandler for EnumHandler {
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
        _resolver: &mut dyn ReferenceResolver,
    ) -> HandlerResult<()> {
        let ordinal = instance.enum_ordinal().ok_or_else(|| HandlerError::ValueMismatch {
            type_name: self.type_name().to_string(),
            member: "ordinal".to_string(),
            found: format!("{instance:?}"),
        })?;
        writer.write_u32(ordinal);
        Ok(())
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
        let ordinal = reader.read_u32()?;
        reader.finish()?;
        self.by_ordinal(ordinal)
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
        let ordinal = self.runtime.constant_ordinal(name)?;
        self.constants.get(ordinal as usize).cloned()
    }
}

impl fmt::Debug for EnumHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumHandler")
            .field("type_id", &self.definition.type_id)
            .field("type_name", &self.definition.type_name)
            .field("constants", &self.constants.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingResolver;

    fn handler() -> EnumHandler {
        let runtime = Arc::new(RuntimeType::enumeration("app.Color", ["RED", "GREEN", "BLUE"]));
        let definition = Arc::new(TypeDefinition::new(
            TypeId::from_raw(1_000_020),
            "app.Color",
            enum_members(runtime.constants()),
        ));
        EnumHandler::new(definition, runtime)
    }

    #[test]
    fn definition_lists_constants() {
        let h = handler();
        assert!(h.definition().is_enum());
        assert_eq!(h.definition().enum_constants(), vec!["RED", "GREEN", "BLUE"]);
    }

    #[test]
    fn create_returns_the_singleton() {
        let h = handler();
        let green = h.constant("GREEN").unwrap();
        assert!(green.ptr_eq(&h.constant("GREEN").unwrap()));
        assert!(h.constant("PINK").is_none());

        let mut writer = RecordWriter::new(h.type_id(), ObjectId::from_raw(3));
        h.store(&mut writer, &green, &mut CountingResolver::default())
            .unwrap();
        let record = writer.finish();
        assert_eq!(&record.content[..], &1u32.to_le_bytes());
        assert!(h.create(&record).unwrap().ptr_eq(&green));
        assert!(h.resolves_constants());
    }

    #[test]
    fn unknown_ordinal() {
        let h = handler();
        let mut writer = RecordWriter::new(h.type_id(), ObjectId::from_raw(3));
        writer.write_u32(9);
        assert!(matches!(
            h.create(&writer.finish()),
            Err(HandlerError::InvalidOrdinal { ordinal: 9, .. })
        ));
    }
}
