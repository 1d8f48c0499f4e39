use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// First object id handed out by a fresh allocator.
pub const DEFAULT_START_OBJECT_ID: u64 = 1_000_000_000_000_000_000;

/// First type id handed out by a fresh allocator.
pub const DEFAULT_START_TYPE_ID: u64 = 1_000_000;

/// Start of the reserved constant id range. Allocated object ids never reach it.
pub const CONSTANT_ID_BASE: u64 = 9_000_000_000_000_000_000;

/// Persistent identifier of one stored instance.
///
/// At most one `ObjectId` exists per instance identity, and an id is never
/// reassigned to a different instance. The value `0` is the null id and
/// encodes a null reference in binary records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The null object id. Represents "no object".
    pub const NULL: ObjectId = ObjectId(0);

    /// Id of the persistent root holder, the first reserved constant.
    pub const ROOT: ObjectId = ObjectId(CONSTANT_ID_BASE + 1);

    /// Wrap a raw value without validation. `0` yields the null id.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Wrap a raw value, rejecting the null id.
    pub fn new(value: u64) -> Result<Self, TypeError> {
        if value == 0 {
            return Err(TypeError::InvalidObjectId(value));
        }
        Ok(Self(value))
    }

    /// Returns `true` if this is the null id.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this id lies in the reserved constant range.
    pub const fn is_constant(&self) -> bool {
        self.0 >= CONSTANT_ID_BASE
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|_| TypeError::InvalidObjectId(0))?;
        Self::new(value)
    }
}

/// Persistent identifier of one structural version of a type.
///
/// A `TypeId` names exactly one immutable type definition, forever. A runtime
/// type may own several type ids across its lineage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u64);

impl TypeId {
    /// The null type id.
    pub const NULL: TypeId = TypeId(0);

    /// Wrap a raw value without validation.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Wrap a raw value, rejecting the null id.
    pub fn new(value: u64) -> Result<Self, TypeError> {
        if value == 0 {
            return Err(TypeError::InvalidTypeId(value));
        }
        Ok(Self(value))
    }

    /// Returns `true` if this is the null id.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ids() {
        assert!(ObjectId::NULL.is_null());
        assert!(TypeId::NULL.is_null());
        assert!(ObjectId::new(0).is_err());
        assert!(TypeId::new(0).is_err());
    }

    #[test]
    fn root_is_constant() {
        assert!(ObjectId::ROOT.is_constant());
        assert!(!ObjectId::from_raw(DEFAULT_START_OBJECT_ID).is_constant());
    }

    #[test]
    fn parse_object_id() {
        let id: ObjectId = "1000000000000000001".parse().unwrap();
        assert_eq!(id.as_u64(), 1_000_000_000_000_000_001);
        assert!("0".parse::<ObjectId>().is_err());
        assert!("abc".parse::<ObjectId>().is_err());
    }

    #[test]
    fn display_is_decimal() {
        assert_eq!(format!("{}", TypeId::from_raw(1_000_042)), "1000042");
        assert_eq!(format!("{:?}", ObjectId::from_raw(7)), "ObjectId(7)");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::from_raw(DEFAULT_START_OBJECT_ID + 5);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(ObjectId::from_raw(1) < ObjectId::from_raw(2));
        assert!(TypeId::from_raw(1_000_000) < TypeId::from_raw(1_000_001));
    }
}
