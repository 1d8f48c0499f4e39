use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use objgraph_binary::{BinaryRecord, CommitBatch};
use objgraph_dictionary::RefactoringMapping;
use objgraph_model::{ObjRef, RuntimeType};
use objgraph_store::{InMemoryChannel, PersistenceSource, PersistenceTarget};
use objgraph_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::error::{EngineError, EngineResult};
use crate::persistence::Persistence;

/// Version of the serialized graph layout.
pub const SERIALIZED_FORMAT: u32 = 1;

/// Self-contained form of one object graph, bincode encoded.
#[derive(Serialize, Deserialize)]
struct SerializedGraph {
    format: u32,
    root: ObjectId,
    /// Text form of every type definition the records use.
    dictionary: String,
    /// Concatenated binary records.
    records: Vec<u8>,
}

/// Converts object graphs to and from standalone byte arrays.
///
/// Every call runs a private persistence over its own in-memory channel, so
/// calls share no object ids and the output carries its own type
/// dictionary. Reading bytes written under an older shape of a type goes
/// through the same legacy mapping as reading storage.
///
/// Enum constants of a deserialized graph belong to that call; compare them
/// by name.
#[derive(Clone, Default)]
pub struct Serializer {
    config: PersistenceConfig,
    refactoring: Option<RefactoringMapping>,
    types: Vec<Arc<RuntimeType>>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy and id settings. Storage settings are ignored.
    pub fn with_config(mut self, mut config: PersistenceConfig) -> Self {
        config.storage.directory = None;
        self.config = config;
        self
    }

    pub fn with_refactoring(mut self, mapping: RefactoringMapping) -> Self {
        self.refactoring = Some(mapping);
        self
    }

    /// Register a runtime type that deserialized records may have.
    pub fn register_type(mut self, runtime: impl Into<Arc<RuntimeType>>) -> Self {
        self.types.push(runtime.into());
        self
    }

    pub(crate) fn open(&self, channel: Arc<InMemoryChannel>) -> EngineResult<Persistence> {
        let mut builder = Persistence::builder()
            .config(self.config.clone())
            .channel(channel);
        if let Some(mapping) = &self.refactoring {
            builder = builder.refactoring(mapping.clone());
        }
        self.types
            .iter()
            .fold(builder, |b, ty| b.register_type(Arc::clone(ty)))
            .build()
    }

    /// Encode `root` and everything it references.
    pub fn serialize(&self, root: &ObjRef) -> EngineResult<Vec<u8>> {
        let channel = Arc::new(InMemoryChannel::new());
        let root_id = self.open(Arc::clone(&channel))?.store(root)?;

        let batch = CommitBatch::new(channel.read_all()?, String::new());
        let graph = SerializedGraph {
            format: SERIALIZED_FORMAT,
            root: root_id,
            dictionary: channel.read_type_dictionary()?,
            records: batch.encode_records().to_vec(),
        };
        let bytes = bincode::serialize(&graph).map_err(|e| EngineError::Malformed(e.to_string()))?;
        debug!(
            records = batch.records.len(),
            bytes = bytes.len(),
            type_name = %root.type_name(),
            "graph serialized"
        );
        Ok(bytes)
    }

    /// Rebuild the graph encoded by [`serialize`](Self::serialize).
    pub fn deserialize(&self, bytes: &[u8]) -> EngineResult<ObjRef> {
        let graph: SerializedGraph =
            bincode::deserialize(bytes).map_err(|e| EngineError::Malformed(e.to_string()))?;
        if graph.format != SERIALIZED_FORMAT {
            return Err(EngineError::Malformed(format!(
                "unsupported format {}, expected {SERIALIZED_FORMAT}",
                graph.format
            )));
        }
        let records = BinaryRecord::decode_all(Bytes::from(graph.records))
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        debug!(records = records.len(), root = %graph.root, "deserializing graph");

        let channel = Arc::new(InMemoryChannel::new());
        channel.write(&CommitBatch::new(records, graph.dictionary))?;
        self.open(channel)?.get(graph.root)
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("types", &self.types.len())
            .field("refactoring", &self.refactoring.is_some())
            .finish()
    }
}

/// Deep copies of object graphs, made by storing and reloading them.
#[derive(Clone, Debug, Default)]
pub struct ObjectCopier {
    serializer: Serializer,
}

impl ObjectCopier {
    pub fn new(serializer: Serializer) -> Self {
        Self { serializer }
    }

    /// A copy of `source` and everything it references. Shared and cyclic
    /// references are shared and cyclic in the copy.
    pub fn copy(&self, source: &ObjRef) -> EngineResult<ObjRef> {
        let channel = Arc::new(InMemoryChannel::new());
        let root = self.serializer.open(Arc::clone(&channel))?.store(source)?;
        self.serializer.open(channel)?.get(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::testing::{color_type, node_type, pixel_type, point_type};
    use objgraph_model::{MemberDescriptor, ObjectBody, Value};
    use objgraph_types::PrimitiveKind;

    fn serializer() -> Serializer {
        Serializer::new()
            .register_type(node_type())
            .register_type(point_type())
            .register_type(color_type())
            .register_type(pixel_type())
    }

    fn node(name: &str) -> ObjRef {
        let n = ObjRef::blank(Arc::new(node_type()));
        n.set("name", name).unwrap();
        n
    }

    fn point(x: i32, y: i32) -> ObjRef {
        let p = ObjRef::blank(Arc::new(point_type()));
        p.set("x", x).unwrap();
        p.set("y", y).unwrap();
        p
    }

    #[test]
    fn graphs_round_trip_through_bytes() {
        let a = node("a");
        let b = node("b");
        a.set("next", b.clone()).unwrap();
        b.set("next", a.clone()).unwrap();
        let points = ObjRef::hash_set([point(1, 2), point(3, 4)]).unwrap();
        let list = ObjRef::list(vec![
            Some(a.clone()),
            None,
            Some(points),
            Some(ObjRef::text("label")),
            Some(ObjRef::bytes(vec![0xab, 0x01])),
            Some(a.clone()),
        ]);

        let bytes = serializer().serialize(&list).unwrap();
        // A second serializer reads the bytes without any shared state.
        let copy = serializer().deserialize(&bytes).unwrap();
        assert!(!copy.ptr_eq(&list));

        let items = copy.list_items().unwrap();
        assert_eq!(items.len(), 6);
        assert!(items[1].is_none());
        let a2 = items[0].clone().unwrap();
        assert!(items[5].as_ref().unwrap().ptr_eq(&a2));
        assert_eq!(a2.get("name").unwrap().as_text(), Some("a"));
        let b2 = a2.get_ref("next").unwrap().unwrap();
        assert_eq!(b2.get("name").unwrap().as_text(), Some("b"));
        assert!(b2.get_ref("next").unwrap().unwrap().ptr_eq(&a2));
        match &*items[2].as_ref().unwrap().read() {
            ObjectBody::Set(points) => {
                assert_eq!(points.len(), 2);
                assert!(points.contains(&point(3, 4)));
                assert!(points.contains(&point(1, 2)));
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(items[3].as_ref().unwrap().as_text().as_deref(), Some("label"));
        assert!(items[4].as_ref().unwrap().content_eq(&ObjRef::bytes(vec![0xab, 0x01])));
    }

    #[test]
    fn older_shapes_deserialize_through_legacy_mapping() {
        let bytes = serializer().serialize(&point(3, -4)).unwrap();

        let coordinate = RuntimeType::record(
            "app.Coordinate",
            vec![
                MemberDescriptor::primitive("x", PrimitiveKind::I64),
                MemberDescriptor::primitive("y", PrimitiveKind::I64),
            ],
        );
        let reader = Serializer::new()
            .with_refactoring(RefactoringMapping::new().with_entry("app.Point", "app.Coordinate"))
            .register_type(coordinate);
        let loaded = reader.deserialize(&bytes).unwrap();
        assert_eq!(loaded.type_name(), "app.Coordinate");
        assert_eq!(loaded.get("x").unwrap(), Value::I64(3));
        assert_eq!(loaded.get("y").unwrap(), Value::I64(-4));
    }

    #[test]
    fn malformed_and_unknown_input() {
        let err = serializer().deserialize(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transfer);

        let mut bytes = serializer().serialize(&node("n")).unwrap();
        bytes[0] = 9;
        let err = serializer().deserialize(&bytes).unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref m) if m.contains("format")), "{err}");

        let bytes = serializer().serialize(&node("n")).unwrap();
        let err = Serializer::new().deserialize(&bytes).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Schema);
    }

    #[test]
    fn copies_are_deep_and_independent() {
        let shared = point(1, 1);
        let pixel_ty = Arc::new(pixel_type());
        let copier = ObjectCopier::new(serializer());
        let red = ObjRef::new(Arc::new(color_type()), ObjectBody::Enum(0)).unwrap();
        let first = ObjRef::blank(pixel_ty.clone());
        first.set("at", shared.clone()).unwrap();
        first.set("color", red).unwrap();
        let second = ObjRef::blank(pixel_ty);
        second.set("at", shared.clone()).unwrap();
        let pair = ObjRef::list(vec![Some(first), Some(second)]);

        let copy = copier.copy(&pair).unwrap();
        let items = copy.list_items().unwrap();
        let at_first = items[0].as_ref().unwrap().get_ref("at").unwrap().unwrap();
        let at_second = items[1].as_ref().unwrap().get_ref("at").unwrap().unwrap();
        assert!(at_first.ptr_eq(&at_second));
        assert!(!at_first.ptr_eq(&shared));

        at_first.set("x", 9).unwrap();
        assert_eq!(shared.get("x").unwrap(), Value::I32(1));

        let color = items[0].as_ref().unwrap().get_ref("color").unwrap().unwrap();
        assert_eq!(color.enum_name().as_deref(), Some("Red"));
        assert!(items[1].as_ref().unwrap().get_ref("color").unwrap().is_none());
    }
}
