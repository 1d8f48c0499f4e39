use std::fmt;
use std::sync::Arc;

use objgraph_binary::{BinaryRecord, RecordWriter};
use objgraph_dictionary::{MemberKind, TypeDefinition, TypeMember};
use objgraph_model::{HashedMap, HashedSet, ModelError, ObjRef, ObjectBody, RuntimeType, TypeShape};
use objgraph_types::{ObjectId, TypeId};

use crate::codec;
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{ObjectLookup, ReferenceResolver, TypeHandler};

/// Persisted members of a built-in shape, or `None` for records and enums.
///
/// Containers are written as flat id lists, never as a hash table layout.
pub fn builtin_members(shape: &TypeShape) -> Option<Vec<TypeMember>> {
    let member = match shape {
        TypeShape::Text => TypeMember::new("value", MemberKind::Text),
        TypeShape::Bytes => TypeMember::new("value", MemberKind::Bytes),
        TypeShape::List | TypeShape::Set => TypeMember::new("elements", MemberKind::References),
        TypeShape::Map => TypeMember::new("entries", MemberKind::Entries),
        TypeShape::Record(_) | TypeShape::Enum(_) => return None,
    };
    Some(vec![member])
}

/// Hand-written handler for the built-in text, bytes and container shapes.
///
/// Sets and maps are populated without hashing; their hash index is rebuilt
/// in [`complete`](TypeHandler::complete), once every element is populated.
pub struct BuiltinHandler {
    definition: Arc<TypeDefinition>,
    runtime: Arc<RuntimeType>,
}

impl BuiltinHandler {
    pub fn new(definition: Arc<TypeDefinition>, runtime: Arc<RuntimeType>) -> Self {
        Self {
            definition,
            runtime,
        }
    }

    fn shape_mismatch(&self) -> HandlerError {
        HandlerError::Model(ModelError::ShapeMismatch {
            type_name: self.runtime.name().to_string(),
            expected: self.runtime.shape().label(),
        })
    }

    fn null_element(&self, object_id: ObjectId) -> HandlerError {
        HandlerError::NullElement {
            type_name: self.runtime.name().to_string(),
            object_id,
        }
    }

    /// Referenced instances in persisted order: list items, set elements, or
    /// interleaved map keys and values.
    fn snapshot(&self, instance: &ObjRef) -> HandlerResult<Snapshot> {
        Ok(match &*instance.read() {
            ObjectBody::Text(s) => Snapshot::Text(s.clone()),
            ObjectBody::Bytes(b) => Snapshot::Bytes(b.clone()),
            ObjectBody::List(items) => Snapshot::Refs(items.clone()),
            ObjectBody::Set(set) => Snapshot::Refs(set.iter().cloned().map(Some).collect()),
            ObjectBody::Map(map) => Snapshot::Entries(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => return Err(self.shape_mismatch()),
        })
    }
}

enum Snapshot {
    Text(String),
    Bytes(Vec<u8>),
    Refs(Vec<Option<ObjRef>>),
    Entries(Vec<(ObjRef, Option<ObjRef>)>),
}

fn resolve(
    target: &Option<ObjRef>,
    resolver: &mut dyn ReferenceResolver,
) -> HandlerResult<ObjectId> {
    match target {
        Some(object) => resolver.resolve(object),
        None => Ok(ObjectId::NULL),
    }
}

impl TypeHandler for BuiltinHandler {
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
        match self.snapshot(instance)? {
            Snapshot::Text(s) => writer.write_text(&s),
            Snapshot::Bytes(b) => writer.write_bytes(&b),
            Snapshot::Refs(items) => {
                let ids = items
                    .iter()
                    .map(|item| resolve(item, resolver))
                    .collect::<HandlerResult<Vec<_>>>()?;
                writer.write_id_list(&ids);
            }
            Snapshot::Entries(entries) => {
                let mut ids = Vec::with_capacity(entries.len());
                for (key, value) in &entries {
                    ids.push((resolver.resolve(key)?, resolve(value, resolver)?));
                }
                writer.write_entries(&ids);
            }
        }
        Ok(())
    }

    fn iterate_references(&self, instance: &ObjRef, visit: &mut dyn FnMut(&ObjRef)) {
        match self.snapshot(instance) {
            Ok(Snapshot::Refs(items)) => items.iter().flatten().for_each(|r| visit(r)),
            Ok(Snapshot::Entries(entries)) => {
                for (key, value) in &entries {
                    visit(key);
                    if let Some(value) = value {
                        visit(value);
                    }
                }
            }
            _ => {}
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
        let from = record.object_id;
        let mut reader = record.reader();
        let body = match self.runtime.shape() {
            TypeShape::Text => ObjectBody::Text(reader.read_text()?),
            TypeShape::Bytes => ObjectBody::Bytes(reader.read_bytes()?),
            TypeShape::List => {
                let items = reader
                    .read_id_list()?
                    .into_iter()
                    .map(|id| lookup.lookup_reference(from, id))
                    .collect::<HandlerResult<Vec<_>>>()?;
                ObjectBody::List(items)
            }
            TypeShape::Set => {
                let mut set = HashedSet::new();
                for id in reader.read_id_list()? {
                    let element = lookup
                        .lookup_reference(from, id)?
                        .ok_or_else(|| self.null_element(from))?;
                    set.push_unhashed(element);
                }
                ObjectBody::Set(set)
            }
            TypeShape::Map => {
                let mut map = HashedMap::new();
                for (key, value) in reader.read_entries()? {
                    let key = lookup
                        .lookup_reference(from, key)?
                        .ok_or_else(|| self.null_element(from))?;
                    map.push_unhashed(key, lookup.lookup_reference(from, value)?);
                }
                ObjectBody::Map(map)
            }
            TypeShape::Record(_) | TypeShape::Enum(_) => return Err(self.shape_mismatch()),
        };
        reader.finish()?;
        *instance.write() = body;
        Ok(())
    }

    fn complete(&self, instance: &ObjRef) -> HandlerResult<()> {
        instance.write().rehash()?;
        Ok(())
    }
}

impl fmt::Debug for BuiltinHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinHandler")
            .field("type_id", &self.definition.type_id)
            .field("type_name", &self.definition.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingResolver, MapLookup};

    fn handler(runtime: Arc<RuntimeType>) -> BuiltinHandler {
        let members = builtin_members(runtime.shape()).unwrap();
        let definition = Arc::new(TypeDefinition::new(
            TypeId::from_raw(1_000_010),
            runtime.name(),
            members,
        ));
        BuiltinHandler::new(definition, runtime)
    }

    fn store(h: &BuiltinHandler, instance: &ObjRef, resolver: &mut CountingResolver) -> BinaryRecord {
        let mut writer = RecordWriter::new(h.type_id(), ObjectId::from_raw(1));
        h.store(&mut writer, instance, resolver).unwrap();
        writer.finish()
    }

    fn lookup_for(resolver: &CountingResolver) -> MapLookup {
        resolver.resolved.iter().fold(MapLookup::default(), |lookup, obj| {
            let id = resolver.id_of(obj).unwrap();
            lookup.with(id, obj.clone())
        })
    }

    #[test]
    fn text_roundtrip() {
        let h = handler(RuntimeType::text());
        let record = store(&h, &ObjRef::text("héllo"), &mut CountingResolver::default());
        let loaded = h.create(&record).unwrap();
        h.populate(&record, &loaded, &MapLookup::default()).unwrap();
        assert_eq!(loaded.as_text().as_deref(), Some("héllo"));
    }

    #[test]
    fn list_keeps_order_and_nulls() {
        let h = handler(RuntimeType::list());
        let a = ObjRef::text("a");
        let list = ObjRef::list(vec![Some(a.clone()), None, Some(a.clone())]);
        let mut resolver = CountingResolver::default();
        let record = store(&h, &list, &mut resolver);
        assert_eq!(resolver.resolved.len(), 1);

        let loaded = h.create(&record).unwrap();
        h.populate(&record, &loaded, &lookup_for(&resolver)).unwrap();
        let items = loaded.list_items().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].as_ref().unwrap().ptr_eq(&a));
        assert!(items[1].is_none());
        assert!(items[2].as_ref().unwrap().ptr_eq(&a));
    }

    #[test]
    fn set_is_rehashed_on_complete() {
        let h = handler(RuntimeType::set());
        let set = ObjRef::hash_set([ObjRef::text("x"), ObjRef::text("y")]).unwrap();
        let mut resolver = CountingResolver::default();
        let record = store(&h, &set, &mut resolver);

        let loaded = h.create(&record).unwrap();
        h.populate(&record, &loaded, &lookup_for(&resolver)).unwrap();
        match &*loaded.read() {
            ObjectBody::Set(s) => assert!(s.is_stale()),
            other => panic!("unexpected body {other:?}"),
        }
        h.complete(&loaded).unwrap();
        match &*loaded.read() {
            ObjectBody::Set(s) => {
                assert!(!s.is_stale());
                assert!(s.contains(&ObjRef::text("x")));
                assert_eq!(s.len(), 2);
            }
            other => panic!("unexpected body {other:?}"),
        };
    }

    #[test]
    fn duplicate_elements_fail_completion() {
        let h = handler(RuntimeType::set());
        let mut w = RecordWriter::new(h.type_id(), ObjectId::from_raw(1));
        let (a, b) = (ObjectId::from_raw(10), ObjectId::from_raw(11));
        w.write_id_list(&[a, b]);
        let record = w.finish();
        let lookup = MapLookup::default()
            .with(a, ObjRef::text("same"))
            .with(b, ObjRef::text("same"));

        let loaded = h.create(&record).unwrap();
        h.populate(&record, &loaded, &lookup).unwrap();
        assert!(matches!(
            h.complete(&loaded),
            Err(HandlerError::Model(ModelError::DuplicateKey { .. }))
        ));
    }

    #[test]
    fn map_entries_and_null_keys() {
        let h = handler(RuntimeType::map());
        let key = ObjRef::text("k");
        let map = ObjRef::hash_map([(key.clone(), None)]).unwrap();
        let mut resolver = CountingResolver::default();
        let record = store(&h, &map, &mut resolver);

        let mut refs = Vec::new();
        h.iterate_persisted_references(&record, &mut |id| refs.push(id))
            .unwrap();
        assert_eq!(refs, vec![resolver.id_of(&key).unwrap()]);

        let mut w = RecordWriter::new(h.type_id(), ObjectId::from_raw(2));
        w.write_entries(&[(ObjectId::NULL, ObjectId::NULL)]);
        let bad = w.finish();
        let loaded = h.create(&bad).unwrap();
        assert!(matches!(
            h.populate(&bad, &loaded, &MapLookup::default()),
            Err(HandlerError::NullElement { .. })
        ));
    }
}
