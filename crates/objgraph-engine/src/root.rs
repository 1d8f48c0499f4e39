use objgraph_model::{MemberDescriptor, RuntimeType};

/// Type of the holder record stored under [`ObjectId::ROOT`](objgraph_types::ObjectId::ROOT).
pub const ROOT_TYPE: &str = "core.Root";

/// Declared type of the holder's single reference member.
pub const ANY_TYPE: &str = "core.Object";

/// Member of the holder record pointing at the application root.
pub const ROOT_MEMBER: &str = "root";

/// The persistent root holder: one reference to whatever the application
/// made its root.
pub fn root_type() -> RuntimeType {
    RuntimeType::record(ROOT_TYPE, vec![MemberDescriptor::reference(ROOT_MEMBER, ANY_TYPE)])
}
