use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use objgraph_types::TypeId;
use tracing::debug;

use crate::definition::{TypeDefinition, TypeLineage};
use crate::error::{DictionaryError, DictionaryResult};
use crate::text;

/// Persisted catalog of every type definition ever produced.
///
/// Append-only: definitions are published once under their type id and never
/// change. Definitions created in this process stay *pending* until a commit
/// writes them next to the records that use them.
pub struct TypeDictionary {
    inner: RwLock<DictionaryState>,
}

#[derive(Default)]
struct DictionaryState {
    by_id: BTreeMap<TypeId, Arc<TypeDefinition>>,
    lineages: HashMap<String, TypeLineage>,
    pending: BTreeSet<TypeId>,
}

impl DictionaryState {
    fn insert(
        &mut self,
        definition: TypeDefinition,
        pending: bool,
    ) -> DictionaryResult<Arc<TypeDefinition>> {
        if let Some(existing) = self.by_id.get(&definition.type_id) {
            if existing.description_equal(&definition) {
                return Ok(Arc::clone(existing));
            }
            return Err(DictionaryError::Conflict {
                type_id: definition.type_id,
                existing: existing.type_name.clone(),
                proposed: definition.type_name.clone(),
            });
        }

        let definition = Arc::new(definition);
        debug!(
            type_id = %definition.type_id,
            type_name = %definition.type_name,
            members = definition.members.len(),
            pending,
            "type definition registered"
        );
        self.by_id.insert(definition.type_id, Arc::clone(&definition));
        self.lineages
            .entry(definition.type_name.clone())
            .or_insert_with(|| TypeLineage::new(definition.type_name.clone()))
            .entries
            .insert(definition.type_id, Arc::clone(&definition));
        if pending {
            self.pending.insert(definition.type_id);
        }
        Ok(definition)
    }
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DictionaryState::default()),
        }
    }

    /// Register a newly created definition. It stays pending until
    /// [`mark_persisted`](Self::mark_persisted).
    ///
    /// Registering a description-equal definition under an existing id
    /// returns the existing one; a different definition under an existing id
    /// is a conflict.
    pub fn register_definition(
        &self,
        definition: TypeDefinition,
    ) -> DictionaryResult<Arc<TypeDefinition>> {
        self.inner
            .write()
            .expect("lock poisoned")
            .insert(definition, true)
    }

    /// Register definitions read back from storage.
    pub fn import_definitions(
        &self,
        definitions: impl IntoIterator<Item = TypeDefinition>,
    ) -> DictionaryResult<usize> {
        let mut state = self.inner.write().expect("lock poisoned");
        let mut count = 0;
        for definition in definitions {
            state.insert(definition, false)?;
            count += 1;
        }
        Ok(count)
    }

    /// Parse and import the text form.
    pub fn import_text(&self, text: &str) -> DictionaryResult<usize> {
        self.import_definitions(text::parse(text)?)
    }

    /// Mark the definition with this id as the current runtime shape of its type.
    pub fn set_runtime_definition(&self, type_id: TypeId) -> DictionaryResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let definition = state
            .by_id
            .get(&type_id)
            .cloned()
            .ok_or(DictionaryError::UnknownTypeId(type_id))?;
        if let Some(lineage) = state.lineages.get_mut(&definition.type_name) {
            lineage.runtime = Some(definition);
        }
        Ok(())
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<TypeDefinition>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_id
            .get(&type_id)
            .cloned()
    }

    pub fn lineage(&self, type_name: &str) -> Option<TypeLineage> {
        self.inner
            .read()
            .expect("lock poisoned")
            .lineages
            .get(type_name)
            .cloned()
    }

    /// Existing definition with the same type name and members, if any.
    pub fn find_description_equal(
        &self,
        definition: &TypeDefinition,
    ) -> Option<Arc<TypeDefinition>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .lineages
            .get(&definition.type_name)?
            .find_description_equal(definition)
            .cloned()
    }

    pub fn highest_type_id(&self) -> Option<TypeId> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_id
            .keys()
            .next_back()
            .copied()
    }

    /// All definitions ordered by type id.
    pub fn definitions(&self) -> Vec<Arc<TypeDefinition>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_id
            .values()
            .cloned()
            .collect()
    }

    /// Definitions not yet written to storage, ordered by type id.
    pub fn pending_definitions(&self) -> Vec<Arc<TypeDefinition>> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .pending
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect()
    }

    pub fn mark_persisted(&self, type_ids: impl IntoIterator<Item = TypeId>) {
        let mut state = self.inner.write().expect("lock poisoned");
        for id in type_ids {
            state.pending.remove(&id);
        }
    }

    /// Text form of the whole dictionary.
    pub fn assemble(&self) -> String {
        let definitions = self.definitions();
        text::assemble(definitions.iter().map(|d| &**d))
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("TypeDictionary")
            .field("definitions", &state.by_id.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
