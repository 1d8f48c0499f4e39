//! Hash-organized containers keyed by [`ObjRef::content_hash`].
//!
//! Both containers keep their elements in insertion order next to a hash
//! index. While a graph is being loaded, elements are staged with
//! `push_unhashed` because their hashes are not valid until every referenced
//! instance is populated; `rehash` then rebuilds the index and rejects
//! duplicate keys.

use std::collections::HashMap;

use crate::error::{ModelError, ModelResult};
use crate::object::ObjRef;
use crate::runtime_type::{MAP_TYPE, SET_TYPE};

#[derive(Clone, Debug, Default)]
struct HashIndex {
    buckets: HashMap<u64, Vec<usize>>,
    stale: bool,
}

impl HashIndex {
    /// Position of the key equal to `key`, scanning linearly while stale.
    fn find<'a>(
        &self,
        key: &ObjRef,
        len: usize,
        key_at: impl Fn(usize) -> &'a ObjRef,
    ) -> Option<usize> {
        if self.stale {
            return (0..len).find(|&i| key_at(i).content_eq(key));
        }
        self.buckets
            .get(&key.content_hash())?
            .iter()
            .copied()
            .find(|&i| key_at(i).content_eq(key))
    }

    fn add(&mut self, key: &ObjRef, position: usize) {
        if !self.stale {
            self.buckets
                .entry(key.content_hash())
                .or_default()
                .push(position);
        }
    }

    /// Rebuild from scratch. Returns the position of the first duplicate.
    fn rebuild<'a>(&mut self, keys: impl Iterator<Item = &'a ObjRef>) -> Result<(), usize> {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        let collected: Vec<&ObjRef> = keys.collect();
        for (i, key) in collected.iter().enumerate() {
            let bucket = buckets.entry(key.content_hash()).or_default();
            if bucket.iter().any(|&j| collected[j].content_eq(key)) {
                return Err(i);
            }
            bucket.push(i);
        }
        self.buckets = buckets;
        self.stale = false;
        Ok(())
    }
}

/// Set of non-null instances with content-based membership.
#[derive(Clone, Debug, Default)]
pub struct HashedSet {
    items: Vec<ObjRef>,
    index: HashIndex,
}

impl HashedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `item`. Returns `false` if an equal element is already present.
    pub fn insert(&mut self, item: ObjRef) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.index.add(&item, self.items.len());
        self.items.push(item);
        true
    }

    pub fn contains(&self, item: &ObjRef) -> bool {
        self.position(item).is_some()
    }

    /// Remove the element equal to `item`.
    pub fn remove(&mut self, item: &ObjRef) -> bool {
        let Some(position) = self.position(item) else {
            return false;
        };
        self.items.remove(position);
        if !self.index.stale {
            // Removing an element cannot introduce a duplicate.
            let _ = self.index.rebuild(self.items.iter());
        }
        true
    }

    /// Append without hashing. The set must be rehashed before use.
    pub fn push_unhashed(&mut self, item: ObjRef) {
        self.index.stale = true;
        self.items.push(item);
    }

    /// Rebuild the hash index from the current element hashes.
    pub fn rehash(&mut self) -> ModelResult<()> {
        self.index
            .rebuild(self.items.iter())
            .map_err(|_| ModelError::DuplicateKey {
                type_name: SET_TYPE.to_string(),
            })
    }

    /// Returns `true` if elements were staged since the last rehash.
    pub fn is_stale(&self) -> bool {
        self.index.stale
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjRef> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, item: &ObjRef) -> Option<usize> {
        self.index.find(item, self.items.len(), |i| &self.items[i])
    }
}

/// Map from non-null keys to nullable values with content-based key lookup.
#[derive(Clone, Debug, Default)]
pub struct HashedMap {
    entries: Vec<(ObjRef, Option<ObjRef>)>,
    index: HashIndex,
}

impl HashedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous value if the key was present.
    pub fn insert(&mut self, key: ObjRef, value: Option<ObjRef>) -> Option<Option<ObjRef>> {
        if let Some(position) = self.position(&key) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.add(&key, self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &ObjRef) -> Option<&Option<ObjRef>> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &ObjRef) -> bool {
        self.position(key).is_some()
    }

    /// Remove the entry for `key`, returning its value.
    pub fn remove(&mut self, key: &ObjRef) -> Option<Option<ObjRef>> {
        let position = self.position(key)?;
        let (_, value) = self.entries.remove(position);
        if !self.index.stale {
            let _ = self.index.rebuild(self.entries.iter().map(|(k, _)| k));
        }
        Some(value)
    }

    /// Append without hashing. The map must be rehashed before use.
    pub fn push_unhashed(&mut self, key: ObjRef, value: Option<ObjRef>) {
        self.index.stale = true;
        self.entries.push((key, value));
    }

    /// Rebuild the hash index from the current key hashes.
    pub fn rehash(&mut self) -> ModelResult<()> {
        self.index
            .rebuild(self.entries.iter().map(|(k, _)| k))
            .map_err(|_| ModelError::DuplicateKey {
                type_name: MAP_TYPE.to_string(),
            })
    }

    pub fn is_stale(&self) -> bool {
        self.index.stale
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjRef, &Option<ObjRef>)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &ObjRef) -> Option<usize> {
        self.index
            .find(key, self.entries.len(), |i| &self.entries[i].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectBody;
    use crate::runtime_type::{MemberDescriptor, RuntimeType};
    use crate::value::Value;
    use objgraph_types::PrimitiveKind;
    use std::sync::Arc;

    fn key_type() -> Arc<RuntimeType> {
        Arc::new(
            RuntimeType::record(
                "app.Key",
                vec![MemberDescriptor::primitive("k", PrimitiveKind::I32)],
            )
            .with_value_semantics(),
        )
    }

    // ------------------------------------------------------------------
    // HashedSet
    // ------------------------------------------------------------------

    #[test]
    fn set_dedups_by_content() {
        let mut set = HashedSet::new();
        assert!(set.insert(ObjRef::text("a")));
        assert!(!set.insert(ObjRef::text("a")));
        assert!(set.insert(ObjRef::text("b")));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&ObjRef::text("b")));
    }

    #[test]
    fn set_remove_keeps_order() {
        let mut set = HashedSet::new();
        for s in ["a", "b", "c"] {
            set.insert(ObjRef::text(s));
        }
        assert!(set.remove(&ObjRef::text("b")));
        assert!(!set.remove(&ObjRef::text("b")));
        let names: Vec<_> = set.iter().filter_map(|r| r.as_text()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(set.contains(&ObjRef::text("c")));
    }

    #[test]
    fn staged_elements_rehash_after_population() {
        let ty = key_type();
        let a = ObjRef::blank(ty.clone());
        let b = ObjRef::blank(ty);

        // Both keys are still blank and would collide if hashed now.
        let mut set = HashedSet::new();
        set.push_unhashed(a.clone());
        set.push_unhashed(b.clone());
        assert!(set.is_stale());

        a.set("k", 1).unwrap();
        b.set("k", 2).unwrap();
        set.rehash().unwrap();
        assert!(!set.is_stale());

        let lookup = ObjRef::record(&key_type(), vec![Value::I32(2)]).unwrap();
        assert!(set.contains(&lookup));
    }

    #[test]
    fn rehash_rejects_duplicates() {
        let mut set = HashedSet::new();
        set.push_unhashed(ObjRef::text("same"));
        set.push_unhashed(ObjRef::text("same"));
        assert!(matches!(set.rehash(), Err(ModelError::DuplicateKey { .. })));
    }

    #[test]
    fn identity_hashed_elements() {
        let ty = Arc::new(RuntimeType::record("app.Plain", vec![]));
        let a = ObjRef::new(ty.clone(), ObjectBody::Record(vec![])).unwrap();
        let b = ObjRef::new(ty, ObjectBody::Record(vec![])).unwrap();
        let mut set = HashedSet::new();
        assert!(set.insert(a.clone()));
        assert!(set.insert(b));
        assert!(!set.insert(a));
    }

    // ------------------------------------------------------------------
    // HashedMap
    // ------------------------------------------------------------------

    #[test]
    fn map_insert_replace_remove() {
        let mut map = HashedMap::new();
        let v1 = ObjRef::text("v1");
        let v2 = ObjRef::text("v2");
        assert!(map.insert(ObjRef::text("k"), Some(v1.clone())).is_none());
        let previous = map.insert(ObjRef::text("k"), Some(v2.clone())).unwrap();
        assert!(previous.unwrap().ptr_eq(&v1));
        assert_eq!(map.len(), 1);

        let got = map.get(&ObjRef::text("k")).unwrap().clone().unwrap();
        assert!(got.ptr_eq(&v2));

        assert!(map.remove(&ObjRef::text("k")).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn map_null_values() {
        let mut map = HashedMap::new();
        map.insert(ObjRef::text("k"), None);
        assert!(map.contains_key(&ObjRef::text("k")));
        assert_eq!(map.get(&ObjRef::text("k")), Some(&None));
    }

    #[test]
    fn map_staged_rehash() {
        let mut map = HashedMap::new();
        map.push_unhashed(ObjRef::text("a"), None);
        map.push_unhashed(ObjRef::text("b"), None);
        // Lookups still work while stale.
        assert!(map.contains_key(&ObjRef::text("b")));
        map.rehash().unwrap();
        assert!(map.contains_key(&ObjRef::text("a")));

        map.push_unhashed(ObjRef::text("a"), None);
        assert!(map.rehash().is_err());
    }
}
