use std::fmt;
use std::sync::{Arc, OnceLock};

use objgraph_types::PrimitiveKind;
use serde::{Deserialize, Serialize};

/// Name of the built-in text type.
pub const TEXT_TYPE: &str = "core.Text";
/// Name of the built-in byte sequence type.
pub const BYTES_TYPE: &str = "core.Bytes";
/// Name of the built-in ordered reference list type.
pub const LIST_TYPE: &str = "core.List";
/// Name of the built-in hashed set type.
pub const SET_TYPE: &str = "core.Set";
/// Name of the built-in hashed map type.
pub const MAP_TYPE: &str = "core.Map";

/// What a record member holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberType {
    /// A fixed-length primitive value.
    Primitive(PrimitiveKind),
    /// A reference to another instance, with the declared type name of its target.
    Reference(String),
    /// Inline, length-prefixed UTF-8 text.
    Text,
    /// Inline, length-prefixed bytes.
    Bytes,
}

impl MemberType {
    /// Returns `true` if values of this type have a fixed persisted length.
    pub fn is_fixed_length(&self) -> bool {
        matches!(self, Self::Primitive(_) | Self::Reference(_))
    }

    /// Returns `true` for reference members.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

/// Declarative description of one record member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    /// Declaring type, for members inherited from a parent shape.
    pub qualifier: Option<String>,
    pub member_type: MemberType,
}

impl MemberDescriptor {
    pub fn new(name: impl Into<String>, member_type: MemberType) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            member_type,
        }
    }

    pub fn primitive(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self::new(name, MemberType::Primitive(kind))
    }

    pub fn reference(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self::new(name, MemberType::Reference(declared_type.into()))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, MemberType::Text)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, MemberType::Bytes)
    }

    /// Set the declaring qualifier.
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// `name` or `Qualifier#name`.
    pub fn identifier(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}#{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Structural shape of a runtime type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeShape {
    /// Plain data type made of declared members.
    Record(Vec<MemberDescriptor>),
    /// Enumeration with named constants, in ordinal order.
    Enum(Vec<String>),
    Text,
    Bytes,
    /// Ordered sequence of nullable references.
    List,
    /// Hash-organized set of non-null references.
    Set,
    /// Hash-organized map from non-null keys to nullable values.
    Map,
}

impl TypeShape {
    /// Short label used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::Enum(_) => "enum",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
        }
    }
}

/// A type registered by the application.
///
/// Runtime types replace runtime introspection: each one carries the
/// declarative member table the reflective type handler is derived from.
/// Types are shared as `Arc<RuntimeType>` and compared by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeType {
    name: String,
    shape: TypeShape,
    value_semantics: bool,
}

impl RuntimeType {
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            value_semantics: false,
        }
    }

    /// A record type with the given members.
    pub fn record(name: impl Into<String>, members: Vec<MemberDescriptor>) -> Self {
        Self::new(name, TypeShape::Record(members))
    }

    /// An enum type with the given constant names.
    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        constants: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            TypeShape::Enum(constants.into_iter().map(Into::into).collect()),
        )
    }

    /// Make instances of this record type hash and compare by content.
    ///
    /// Value-semantics records used as set elements or map keys must not
    /// reach themselves through their own members.
    pub fn with_value_semantics(mut self) -> Self {
        self.value_semantics = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    pub fn has_value_semantics(&self) -> bool {
        self.value_semantics
    }

    /// Record members, empty for every other shape.
    pub fn members(&self) -> &[MemberDescriptor] {
        match &self.shape {
            TypeShape::Record(members) => members,
            _ => &[],
        }
    }

    /// Index of the member called `name`.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members().iter().position(|m| m.name == name)
    }

    /// Enum constant names, empty for every other shape.
    pub fn constants(&self) -> &[String] {
        match &self.shape {
            TypeShape::Enum(names) => names,
            _ => &[],
        }
    }

    /// Ordinal of the enum constant called `name`.
    pub fn constant_ordinal(&self, name: &str) -> Option<u32> {
        self.constants()
            .iter()
            .position(|c| c == name)
            .map(|i| i as u32)
    }

    /// The shared built-in text type.
    pub fn text() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| Arc::new(Self::new(TEXT_TYPE, TypeShape::Text)))
            .clone()
    }

    /// The shared built-in byte sequence type.
    pub fn bytes() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| Arc::new(Self::new(BYTES_TYPE, TypeShape::Bytes)))
            .clone()
    }

    /// The shared built-in list type.
    pub fn list() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| Arc::new(Self::new(LIST_TYPE, TypeShape::List)))
            .clone()
    }

    /// The shared built-in set type.
    pub fn set() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| Arc::new(Self::new(SET_TYPE, TypeShape::Set)))
            .clone()
    }

    /// The shared built-in map type.
    pub fn map() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| Arc::new(Self::new(MAP_TYPE, TypeShape::Map)))
            .clone()
    }

    /// All built-in types.
    pub fn builtins() -> Vec<Arc<RuntimeType>> {
        vec![
            Self::text(),
            Self::bytes(),
            Self::list(),
            Self::set(),
            Self::map(),
        ]
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RuntimeType {}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.shape.label())
    }
}
