use std::fmt;

use objgraph_model::{MemberDescriptor, MemberType};
use objgraph_types::PrimitiveKind;
use serde::{Deserialize, Serialize};

/// Persisted kind of a type member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    Primitive(PrimitiveKind),
    /// 8-byte object id of a referenced instance of the declared type.
    Reference(String),
    /// Length-prefixed UTF-8 text.
    Text,
    /// Length-prefixed bytes.
    Bytes,
    /// Length-prefixed list of object ids.
    References,
    /// Length-prefixed list of key/value object id pairs.
    Entries,
    /// 4-byte enum ordinal.
    Ordinal,
    /// Name of an enum constant. Occupies no bytes in a record.
    EnumConstant,
}

impl MemberKind {
    /// Token used in the dictionary text form.
    pub fn token(&self) -> &str {
        match self {
            Self::Primitive(kind) => kind.keyword(),
            Self::Reference(type_name) => type_name,
            Self::Text => "[text]",
            Self::Bytes => "[bytes]",
            Self::References => "[refs]",
            Self::Entries => "[entries]",
            Self::Ordinal => "[ordinal]",
            Self::EnumConstant => "enum",
        }
    }

    /// Parse a text form token. Anything unrecognized is a reference type name.
    pub fn from_token(token: &str) -> MemberKind {
        match token {
            "[text]" => Self::Text,
            "[bytes]" => Self::Bytes,
            "[refs]" => Self::References,
            "[entries]" => Self::Entries,
            "[ordinal]" => Self::Ordinal,
            "enum" => Self::EnumConstant,
            other => match PrimitiveKind::from_keyword(other) {
                Some(kind) => Self::Primitive(kind),
                None => Self::Reference(other.to_string()),
            },
        }
    }

    pub fn persisted_length_min(&self) -> u64 {
        match self {
            Self::Primitive(kind) => kind.byte_len() as u64,
            Self::Reference(_) => 8,
            Self::Ordinal => 4,
            Self::Text | Self::Bytes | Self::References | Self::Entries => 8,
            Self::EnumConstant => 0,
        }
    }

    pub fn persisted_length_max(&self) -> u64 {
        match self {
            Self::Text | Self::Bytes | Self::References | Self::Entries => u64::MAX,
            other => other.persisted_length_min(),
        }
    }

    pub fn is_fixed_length(&self) -> bool {
        self.persisted_length_min() == self.persisted_length_max()
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

/// One member of a type definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMember {
    pub name: String,
    pub qualifier: Option<String>,
    pub kind: MemberKind,
}

impl TypeMember {
    pub fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            kind,
        }
    }

    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Persisted form of a runtime member descriptor.
    pub fn from_descriptor(descriptor: &MemberDescriptor) -> Self {
        let kind = match &descriptor.member_type {
            MemberType::Primitive(kind) => MemberKind::Primitive(*kind),
            MemberType::Reference(type_name) => MemberKind::Reference(type_name.clone()),
            MemberType::Text => MemberKind::Text,
            MemberType::Bytes => MemberKind::Bytes,
        };
        Self {
            name: descriptor.name.clone(),
            qualifier: descriptor.qualifier.clone(),
            kind,
        }
    }

    /// `name` or `Qualifier#name`.
    pub fn identifier(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}#{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Parse `name` or `Qualifier#name`. The qualifier ends at the last `#`.
    pub fn split_identifier(identifier: &str) -> (Option<&str>, &str) {
        match identifier.rsplit_once('#') {
            Some((qualifier, name)) => (Some(qualifier), name),
            None => (None, identifier),
        }
    }

    /// Same kind and declared type, names ignored.
    pub fn structurally_equal(&self, other: &TypeMember) -> bool {
        self.kind == other.kind
    }

    /// Same kind, declared type, name and qualifier.
    pub fn description_equal(&self, other: &TypeMember) -> bool {
        self == other
    }
}

impl fmt::Display for TypeMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.token(), self.identifier())
    }
}
