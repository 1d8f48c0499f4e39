use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::error::{ModelError, ModelResult};
use crate::hashed::{HashedMap, HashedSet};
use crate::runtime_type::{RuntimeType, TypeShape};
use crate::value::Value;

/// State of one instance.
#[derive(Clone, Debug)]
pub enum ObjectBody {
    /// Member values in declaration order.
    Record(Vec<Value>),
    /// Enum constant ordinal.
    Enum(u32),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Option<ObjRef>>),
    Set(HashedSet),
    Map(HashedMap),
}

impl ObjectBody {
    /// Blank body for a type: default member values or an empty container.
    pub fn blank(ty: &RuntimeType) -> ObjectBody {
        match ty.shape() {
            TypeShape::Record(members) => ObjectBody::Record(
                members
                    .iter()
                    .map(|m| Value::default_for(&m.member_type))
                    .collect(),
            ),
            TypeShape::Enum(_) => ObjectBody::Enum(0),
            TypeShape::Text => ObjectBody::Text(String::new()),
            TypeShape::Bytes => ObjectBody::Bytes(Vec::new()),
            TypeShape::List => ObjectBody::List(Vec::new()),
            TypeShape::Set => ObjectBody::Set(HashedSet::new()),
            TypeShape::Map => ObjectBody::Map(HashedMap::new()),
        }
    }

    /// Returns `true` if this body matches the given shape.
    pub fn matches(&self, shape: &TypeShape) -> bool {
        match (self, shape) {
            (ObjectBody::Record(values), TypeShape::Record(members)) => {
                values.len() == members.len()
                    && values
                        .iter()
                        .zip(members)
                        .all(|(v, m)| v.fits(&m.member_type))
            }
            (ObjectBody::Enum(ordinal), TypeShape::Enum(names)) => {
                (*ordinal as usize) < names.len()
            }
            (ObjectBody::Text(_), TypeShape::Text)
            | (ObjectBody::Bytes(_), TypeShape::Bytes)
            | (ObjectBody::List(_), TypeShape::List)
            | (ObjectBody::Set(_), TypeShape::Set)
            | (ObjectBody::Map(_), TypeShape::Map) => true,
            _ => false,
        }
    }

    /// Rebuild the hash index of a set or map body. No-op for other bodies.
    pub fn rehash(&mut self) -> ModelResult<()> {
        match self {
            ObjectBody::Set(set) => set.rehash(),
            ObjectBody::Map(map) => map.rehash(),
            _ => Ok(()),
        }
    }
}

struct ObjectCell {
    ty: Arc<RuntimeType>,
    body: RwLock<ObjectBody>,
}

/// Shared handle to a live instance.
///
/// Cloning an `ObjRef` clones the handle, never the instance: identity is the
/// allocation, compared with [`ObjRef::ptr_eq`]. The body sits behind a
/// `RwLock` so instances can be shared across threads.
///
/// Handles are strong references. A cyclic graph keeps itself alive until the
/// application breaks one of its edges.
#[derive(Clone)]
pub struct ObjRef(Arc<ObjectCell>);

impl ObjRef {
    /// Create an instance with the given body.
    pub fn new(ty: Arc<RuntimeType>, body: ObjectBody) -> ModelResult<ObjRef> {
        if !body.matches(ty.shape()) {
            return Err(ModelError::ShapeMismatch {
                type_name: ty.name().to_string(),
                expected: ty.shape().label(),
            });
        }
        Ok(Self::from_parts(ty, body))
    }

    /// Create an instance with default member values, without validation.
    pub fn blank(ty: Arc<RuntimeType>) -> ObjRef {
        let body = ObjectBody::blank(&ty);
        Self::from_parts(ty, body)
    }

    fn from_parts(ty: Arc<RuntimeType>, body: ObjectBody) -> ObjRef {
        ObjRef(Arc::new(ObjectCell {
            ty,
            body: RwLock::new(body),
        }))
    }

    /// Create a record instance from member values in declaration order.
    pub fn record(ty: &Arc<RuntimeType>, values: Vec<Value>) -> ModelResult<ObjRef> {
        Self::new(Arc::clone(ty), ObjectBody::Record(values))
    }

    pub fn text(value: impl Into<String>) -> ObjRef {
        Self::from_parts(RuntimeType::text(), ObjectBody::Text(value.into()))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> ObjRef {
        Self::from_parts(RuntimeType::bytes(), ObjectBody::Bytes(value.into()))
    }

    pub fn list(items: Vec<Option<ObjRef>>) -> ObjRef {
        Self::from_parts(RuntimeType::list(), ObjectBody::List(items))
    }

    /// Create a set instance. Fails if two elements are content-equal.
    pub fn hash_set(items: impl IntoIterator<Item = ObjRef>) -> ModelResult<ObjRef> {
        let mut set = HashedSet::new();
        for item in items {
            if !set.insert(item) {
                return Err(ModelError::DuplicateKey {
                    type_name: RuntimeType::set().name().to_string(),
                });
            }
        }
        Ok(Self::from_parts(RuntimeType::set(), ObjectBody::Set(set)))
    }

    /// Create a map instance. Fails if two keys are content-equal.
    pub fn hash_map(
        entries: impl IntoIterator<Item = (ObjRef, Option<ObjRef>)>,
    ) -> ModelResult<ObjRef> {
        let mut map = HashedMap::new();
        for (key, value) in entries {
            if map.insert(key, value).is_some() {
                return Err(ModelError::DuplicateKey {
                    type_name: RuntimeType::map().name().to_string(),
                });
            }
        }
        Ok(Self::from_parts(RuntimeType::map(), ObjectBody::Map(map)))
    }

    pub fn runtime_type(&self) -> &Arc<RuntimeType> {
        &self.0.ty
    }

    pub fn type_name(&self) -> &str {
        self.0.ty.name()
    }

    /// Returns `true` if both handles point at the same instance.
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Process-local identity of the instance. Only stable while the
    /// instance is alive.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakObjRef {
        WeakObjRef(Arc::downgrade(&self.0))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ObjectBody> {
        self.0.body.read().expect("lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ObjectBody> {
        self.0.body.write().expect("lock poisoned")
    }

    /// Value of the record member called `member`.
    pub fn get(&self, member: &str) -> ModelResult<Value> {
        let index = self.member_index(member)?;
        match &*self.read() {
            ObjectBody::Record(values) => Ok(values[index].clone()),
            _ => Err(self.not_a_record()),
        }
    }

    /// Referenced instance held by the record member called `member`.
    pub fn get_ref(&self, member: &str) -> ModelResult<Option<ObjRef>> {
        Ok(self.get(member)?.as_ref().cloned())
    }

    /// Assign the record member called `member`.
    pub fn set(&self, member: &str, value: impl Into<Value>) -> ModelResult<()> {
        let index = self.member_index(member)?;
        let value = value.into();
        let declared = &self.0.ty.members()[index].member_type;
        if !value.fits(declared) {
            return Err(ModelError::ValueMismatch {
                type_name: self.type_name().to_string(),
                member: member.to_string(),
                expected: format!("{declared:?}"),
                found: format!("{value:?}"),
            });
        }
        match &mut *self.write() {
            ObjectBody::Record(values) => {
                values[index] = value;
                Ok(())
            }
            _ => Err(self.not_a_record()),
        }
    }

    fn member_index(&self, member: &str) -> ModelResult<usize> {
        self.0
            .ty
            .member_index(member)
            .ok_or_else(|| ModelError::UnknownMember {
                type_name: self.type_name().to_string(),
                member: member.to_string(),
            })
    }

    fn not_a_record(&self) -> ModelError {
        ModelError::ShapeMismatch {
            type_name: self.type_name().to_string(),
            expected: "record",
        }
    }

    /// Text content of a text instance.
    pub fn as_text(&self) -> Option<String> {
        match &*self.read() {
            ObjectBody::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Ordinal of an enum constant.
    pub fn enum_ordinal(&self) -> Option<u32> {
        match &*self.read() {
            ObjectBody::Enum(o) => Some(*o),
            _ => None,
        }
    }

    /// Name of an enum constant.
    pub fn enum_name(&self) -> Option<String> {
        let ordinal = self.enum_ordinal()?;
        self.0.ty.constants().get(ordinal as usize).cloned()
    }

    /// Items of a list instance.
    pub fn list_items(&self) -> Option<Vec<Option<ObjRef>>> {
        match &*self.read() {
            ObjectBody::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Hash used by hashed containers.
    ///
    /// Text, bytes and enum constants hash by content, as do records whose
    /// type has value semantics. Everything else hashes by identity, so the
    /// hash of a container never needs to lock the container.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        if !self.hashes_by_content() {
            self.identity().hash(&mut hasher);
            return hasher.finish();
        }
        self.type_name().hash(&mut hasher);
        match &*self.read() {
            ObjectBody::Record(values) => {
                for v in values {
                    v.content_hash(&mut hasher);
                }
            }
            ObjectBody::Enum(o) => o.hash(&mut hasher),
            ObjectBody::Text(s) => s.hash(&mut hasher),
            ObjectBody::Bytes(b) => b.hash(&mut hasher),
            _ => {}
        }
        hasher.finish()
    }

    /// Equality used by hashed containers, consistent with [`content_hash`](Self::content_hash).
    pub fn content_eq(&self, other: &ObjRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if !self.hashes_by_content() || self.type_name() != other.type_name() {
            return false;
        }
        let a = self.read();
        let b = other.read();
        match (&*a, &*b) {
            (ObjectBody::Record(x), ObjectBody::Record(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| l.content_eq(r))
            }
            (ObjectBody::Enum(x), ObjectBody::Enum(y)) => x == y,
            (ObjectBody::Text(x), ObjectBody::Text(y)) => x == y,
            (ObjectBody::Bytes(x), ObjectBody::Bytes(y)) => x == y,
            _ => false,
        }
    }

    fn hashes_by_content(&self) -> bool {
        match self.0.ty.shape() {
            TypeShape::Text | TypeShape::Bytes | TypeShape::Enum(_) => true,
            TypeShape::Record(_) => self.0.ty.has_value_semantics(),
            TypeShape::List | TypeShape::Set | TypeShape::Map => false,
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjRef {}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.type_name(), self.identity())
    }
}

/// Non-owning handle to an instance.
#[derive(Clone, Debug)]
pub struct WeakObjRef(Weak<ObjectCell>);

impl WeakObjRef {
    pub fn upgrade(&self) -> Option<ObjRef> {
        self.0.upgrade().map(ObjRef)
    }

    /// Returns `true` once the instance has been dropped.
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCell")
            .field("type", &self.ty.name())
            .finish()
    }
}
