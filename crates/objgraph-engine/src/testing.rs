//! Runtime types and persistence setups shared by engine tests.

use std::sync::{Arc, Mutex};

use objgraph_model::{MemberDescriptor, ObjRef, RuntimeType};
use objgraph_store::InMemoryChannel;
use objgraph_types::PrimitiveKind;

use crate::persistence::Persistence;
use crate::storer::{CommitListener, CommitSummary};

pub(crate) fn node_type() -> RuntimeType {
    RuntimeType::record(
        "app.Node",
        vec![
            MemberDescriptor::text("name"),
            MemberDescriptor::reference("next", "app.Node"),
        ],
    )
}

pub(crate) fn point_type() -> RuntimeType {
    RuntimeType::record(
        "app.Point",
        vec![
            MemberDescriptor::primitive("x", PrimitiveKind::I32),
            MemberDescriptor::primitive("y", PrimitiveKind::I32),
        ],
    )
    .with_value_semantics()
}

pub(crate) fn color_type() -> RuntimeType {
    RuntimeType::enumeration("app.Color", ["Red", "Green", "Blue"])
}

pub(crate) fn pixel_type() -> RuntimeType {
    RuntimeType::record(
        "app.Pixel",
        vec![
            MemberDescriptor::reference("color", "app.Color"),
            MemberDescriptor::reference("at", "app.Point"),
        ],
    )
}

/// A persistence over a shared in-memory channel with the test types registered.
pub(crate) fn memory_persistence() -> (Persistence, Arc<InMemoryChannel>) {
    let channel = Arc::new(InMemoryChannel::new());
    let persistence = reopen(&channel);
    (persistence, channel)
}

/// A fresh persistence over existing channel contents, as after a restart.
pub(crate) fn reopen(channel: &Arc<InMemoryChannel>) -> Persistence {
    Persistence::builder()
        .channel(channel.clone())
        .register_type(node_type())
        .register_type(point_type())
        .register_type(color_type())
        .register_type(pixel_type())
        .build()
        .unwrap()
}

pub(crate) fn node(persistence: &Persistence, name: &str) -> ObjRef {
    let ty = persistence.register_type(node_type()).unwrap();
    let n = ObjRef::blank(ty);
    n.set("name", name).unwrap();
    n
}

pub(crate) fn point(persistence: &Persistence, x: i32, y: i32) -> ObjRef {
    let ty = persistence.register_type(point_type()).unwrap();
    let p = ObjRef::blank(ty);
    p.set("x", x).unwrap();
    p.set("y", y).unwrap();
    p
}

/// Remembers every commit summary it is told about.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) summaries: Mutex<Vec<CommitSummary>>,
}

impl CommitListener for RecordingListener {
    fn on_commit(&self, summary: &CommitSummary) {
        self.summaries.lock().unwrap().push(*summary);
    }
}
