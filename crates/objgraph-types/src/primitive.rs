use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fixed-length value kinds a record member can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// A Unicode scalar value, persisted as 4 bytes.
    Char,
}

impl PrimitiveKind {
    /// All kinds, in declaration order.
    pub const ALL: [PrimitiveKind; 8] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
        Self::Char,
    ];

    /// Persisted byte length.
    pub const fn byte_len(&self) -> usize {
        match self {
            Self::Bool | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 | Self::Char => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Keyword used in the type dictionary.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
        }
    }

    /// Parse a dictionary keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl std::str::FromStr for PrimitiveKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s).ok_or_else(|| TypeError::UnknownPrimitive(s.to_string()))
    }
}
