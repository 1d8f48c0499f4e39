use std::fmt;
use std::hash::{Hash, Hasher};

use objgraph_types::PrimitiveKind;

use crate::object::ObjRef;
use crate::runtime_type::MemberType;

/// A member value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    Ref(ObjRef),
}

impl Value {
    /// Default value for a member of the given type: zero, empty, or null.
    pub fn default_for(member_type: &MemberType) -> Value {
        match member_type {
            MemberType::Primitive(kind) => Self::zero(*kind),
            MemberType::Reference(_) => Value::Null,
            MemberType::Text => Value::Text(String::new()),
            MemberType::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Zero value of a primitive kind.
    pub fn zero(kind: PrimitiveKind) -> Value {
        match kind {
            PrimitiveKind::Bool => Value::Bool(false),
            PrimitiveKind::I8 => Value::I8(0),
            PrimitiveKind::I16 => Value::I16(0),
            PrimitiveKind::I32 => Value::I32(0),
            PrimitiveKind::I64 => Value::I64(0),
            PrimitiveKind::F32 => Value::F32(0.0),
            PrimitiveKind::F64 => Value::F64(0.0),
            PrimitiveKind::Char => Value::Char('\0'),
        }
    }

    /// The primitive kind of this value, if it is a primitive.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Bool(_) => PrimitiveKind::Bool,
            Value::I8(_) => PrimitiveKind::I8,
            Value::I16(_) => PrimitiveKind::I16,
            Value::I32(_) => PrimitiveKind::I32,
            Value::I64(_) => PrimitiveKind::I64,
            Value::F32(_) => PrimitiveKind::F32,
            Value::F64(_) => PrimitiveKind::F64,
            Value::Char(_) => PrimitiveKind::Char,
            _ => return None,
        })
    }

    /// Returns `true` if this value may be assigned to a member of `member_type`.
    pub fn fits(&self, member_type: &MemberType) -> bool {
        match (member_type, self) {
            (MemberType::Primitive(kind), v) => v.primitive_kind() == Some(*kind),
            (MemberType::Reference(_), Value::Null | Value::Ref(_)) => true,
            (MemberType::Text, Value::Text(_)) => true,
            (MemberType::Bytes, Value::Bytes(_)) => true,
            _ => false,
        }
    }

    /// Convert a primitive value to `target` if the conversion is lossless
    /// widening (or the identity).
    pub fn widen_to(&self, target: PrimitiveKind) -> Option<Value> {
        use PrimitiveKind as K;
        let source = self.primitive_kind()?;
        if source == target {
            return Some(self.clone());
        }
        let widened = match (self, target) {
            (Value::I8(v), K::I16) => Value::I16(*v as i16),
            (Value::I8(v), K::I32) => Value::I32(*v as i32),
            (Value::I8(v), K::I64) => Value::I64(*v as i64),
            (Value::I8(v), K::F32) => Value::F32(*v as f32),
            (Value::I8(v), K::F64) => Value::F64(*v as f64),
            (Value::I16(v), K::I32) => Value::I32(*v as i32),
            (Value::I16(v), K::I64) => Value::I64(*v as i64),
            (Value::I16(v), K::F32) => Value::F32(*v as f32),
            (Value::I16(v), K::F64) => Value::F64(*v as f64),
            (Value::I32(v), K::I64) => Value::I64(*v as i64),
            (Value::I32(v), K::F64) => Value::F64(*v as f64),
            (Value::F32(v), K::F64) => Value::F64(*v as f64),
            (Value::Char(c), K::I32) => Value::I32(*c as i32),
            (Value::Char(c), K::I64) => Value::I64(*c as i64),
            _ => return None,
        };
        Some(widened)
    }

    /// Returns `true` if a value of kind `from` widens to `to`.
    pub fn widens(from: PrimitiveKind, to: PrimitiveKind) -> bool {
        Self::zero(from).widen_to(to).is_some()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_ref(&self) -> Option<&ObjRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Content hash. References hash through [`ObjRef::content_hash`].
    pub fn content_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::I8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Char(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Ref(r) => r.content_hash().hash(state),
        }
    }

    /// Content equality. Floats compare bitwise; references through
    /// [`ObjRef::content_eq`].
    pub fn content_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.content_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    /// Primitive and inline values compare by content; references by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (a, b) => a.content_eq(b),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}i8"),
            Value::I16(v) => write!(f, "{v}i16"),
            Value::I32(v) => write!(f, "{v}i32"),
            Value::I64(v) => write!(f, "{v}i64"),
            Value::F32(v) => write!(f, "{v}f32"),
            Value::F64(v) => write!(f, "{v}f64"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Ref(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Value::Ref(v)
    }
}

impl From<Option<ObjRef>> for Value {
    fn from(v: Option<ObjRef>) -> Self {
        v.map_or(Value::Null, Value::Ref)
    }
}
