use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use objgraph_dictionary::{TypeDefinition, TypeDictionary, TypeMember};
use objgraph_model::{ObjRef, RuntimeType, TypeShape};
use objgraph_types::{IdAllocator, TypeId};
use tracing::{debug, info};

use crate::alias::AliasHandler;
use crate::custom::{builtin_members, BuiltinHandler};
use crate::enumeration::{enum_members, EnumHandler};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{LegacyTypeHandlerCreator, TypeHandler};
use crate::reflective::{record_members, ReflectiveHandler};

/// Persisted members for a runtime type's current shape.
pub fn definition_members(runtime: &RuntimeType) -> Vec<TypeMember> {
    match runtime.shape() {
        TypeShape::Record(_) => record_members(runtime),
        TypeShape::Enum(constants) => enum_members(constants),
        shape => builtin_members(shape).unwrap_or_default(),
    }
}

/// Handler matching a runtime type's shape.
pub fn create_handler(
    definition: Arc<TypeDefinition>,
    runtime: Arc<RuntimeType>,
) -> Arc<dyn TypeHandler> {
    match runtime.shape() {
        TypeShape::Record(_) => Arc::new(ReflectiveHandler::new(definition, runtime)),
        TypeShape::Enum(_) => Arc::new(EnumHandler::new(definition, runtime)),
        _ => Arc::new(BuiltinHandler::new(definition, runtime)),
    }
}

fn same_shape(a: &RuntimeType, b: &RuntimeType) -> bool {
    a.shape() == b.shape() && a.has_value_semantics() == b.has_value_semantics()
}

/// Maps runtime types and stored type ids to type handlers.
///
/// Current handlers are created on first use and keep their type id for the
/// life of the registry. Handlers for stored definitions that differ from
/// the runtime shape are built by the installed [`LegacyTypeHandlerCreator`]
/// and cached per (stored id, current id) pair.
pub struct TypeHandlerRegistry {
    dictionary: Arc<TypeDictionary>,
    allocator: Arc<dyn IdAllocator>,
    inner: RwLock<RegistryState>,
    /// Alias and legacy handlers keyed by (stored type id, current type id).
    derived: Mutex<HashMap<(TypeId, TypeId), Arc<dyn TypeHandler>>>,
    legacy_creator: RwLock<Option<Arc<dyn LegacyTypeHandlerCreator>>>,
}

struct RegistryState {
    runtime_types: HashMap<String, Arc<RuntimeType>>,
    by_name: HashMap<String, Arc<dyn TypeHandler>>,
    by_id: BTreeMap<TypeId, Arc<dyn TypeHandler>>,
}

impl TypeHandlerRegistry {
    /// Create a registry with the built-in types registered.
    pub fn new(dictionary: Arc<TypeDictionary>, allocator: Arc<dyn IdAllocator>) -> Self {
        let runtime_types = RuntimeType::builtins()
            .into_iter()
            .map(|ty| (ty.name().to_string(), ty))
            .collect();
        Self {
            dictionary,
            allocator,
            inner: RwLock::new(RegistryState {
                runtime_types,
                by_name: HashMap::new(),
                by_id: BTreeMap::new(),
            }),
            derived: Mutex::new(HashMap::new()),
            legacy_creator: RwLock::new(None),
        }
    }

    pub fn dictionary(&self) -> &Arc<TypeDictionary> {
        &self.dictionary
    }

    pub fn set_legacy_creator(&self, creator: Arc<dyn LegacyTypeHandlerCreator>) {
        *self.legacy_creator.write().expect("lock poisoned") = Some(creator);
    }

    /// Register a runtime type. Registering the same shape twice returns the
    /// first registration.
    pub fn register_type(
        &self,
        runtime: impl Into<Arc<RuntimeType>>,
    ) -> HandlerResult<Arc<RuntimeType>> {
        let runtime = runtime.into();
        let mut state = self.inner.write().expect("lock poisoned");
        if let Some(existing) = state.runtime_types.get(runtime.name()) {
            if !same_shape(existing, &runtime) {
                return Err(HandlerError::TypeRedefined {
                    type_name: runtime.name().to_string(),
                });
            }
            return Ok(Arc::clone(existing));
        }
        debug!(type_name = %runtime.name(), shape = runtime.shape().label(), "runtime type registered");
        state
            .runtime_types
            .insert(runtime.name().to_string(), Arc::clone(&runtime));
        Ok(runtime)
    }

    pub fn runtime_type(&self, type_name: &str) -> Option<Arc<RuntimeType>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .runtime_types
            .get(type_name)
            .cloned()
    }

    /// Current handler for a type name, if one has been created.
    pub fn lookup_type_handler(&self, type_name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_name
            .get(type_name)
            .cloned()
    }

    /// Current handler for a registered runtime type, created on first use.
    ///
    /// A new handler reuses the type id of a description-equal definition
    /// already in the dictionary; otherwise it allocates a fresh type id.
    pub fn ensure_type_handler(&self, type_name: &str) -> HandlerResult<Arc<dyn TypeHandler>> {
        if let Some(handler) = self.lookup_type_handler(type_name) {
            return Ok(handler);
        }

        let mut state = self.inner.write().expect("lock poisoned");
        if let Some(handler) = state.by_name.get(type_name) {
            return Ok(Arc::clone(handler));
        }
        let runtime = state
            .runtime_types
            .get(type_name)
            .cloned()
            .ok_or_else(|| HandlerError::UnknownRuntimeType(type_name.to_string()))?;

        let mut definition =
            TypeDefinition::new(TypeId::NULL, type_name, definition_members(&runtime));
        let reused = self.dictionary.find_description_equal(&definition);
        definition.type_id = match &reused {
            Some(existing) => existing.type_id,
            None => self.allocator.next_type_id()?,
        };
        let definition = self.dictionary.register_definition(definition)?;
        self.dictionary.set_runtime_definition(definition.type_id)?;

        debug!(
            type_id = %definition.type_id,
            type_name,
            reused = reused.is_some(),
            "type handler created"
        );
        let handler = create_handler(definition, runtime);
        state
            .by_name
            .insert(type_name.to_string(), Arc::clone(&handler));
        state.by_id.insert(handler.type_id(), Arc::clone(&handler));
        Ok(handler)
    }

    /// Handler for a live instance. An unregistered runtime type is
    /// registered on the way.
    pub fn handler_for_instance(&self, instance: &ObjRef) -> HandlerResult<Arc<dyn TypeHandler>> {
        let runtime = instance.runtime_type();
        match self.runtime_type(runtime.name()) {
            Some(registered) if !Arc::ptr_eq(&registered, runtime) && !same_shape(&registered, runtime) => {
                return Err(HandlerError::TypeRedefined {
                    type_name: runtime.name().to_string(),
                });
            }
            Some(_) => {}
            None => {
                self.register_type(Arc::clone(runtime))?;
            }
        }
        self.ensure_type_handler(runtime.name())
    }

    /// Handler able to read records written under `type_id`.
    ///
    /// Falls back from the current handler to an alias of it, then to a
    /// legacy handler built by the installed creator.
    pub fn handler_for_type_id(&self, type_id: TypeId) -> HandlerResult<Arc<dyn TypeHandler>> {
        if let Some(handler) = self.inner.read().expect("lock poisoned").by_id.get(&type_id) {
            return Ok(Arc::clone(handler));
        }

        let stored = self
            .dictionary
            .lookup(type_id)
            .ok_or(HandlerError::UnknownTypeId(type_id))?;
        let current = self.current_handler_for(&stored)?;
        if current.type_id() == type_id {
            return Ok(current);
        }

        let key = (type_id, current.type_id());
        let mut derived = self.derived.lock().expect("lock poisoned");
        if let Some(handler) = derived.get(&key) {
            return Ok(Arc::clone(handler));
        }
        let handler: Arc<dyn TypeHandler> = if stored.type_name == current.type_name()
            && stored.members == current.definition().members
        {
            Arc::new(AliasHandler::new(stored, current))
        } else {
            self.create_legacy_handler(stored, current)?
        };
        derived.insert(key, Arc::clone(&handler));
        Ok(handler)
    }

    fn current_handler_for(&self, stored: &TypeDefinition) -> HandlerResult<Arc<dyn TypeHandler>> {
        if self.runtime_type(&stored.type_name).is_some() {
            return self.ensure_type_handler(&stored.type_name);
        }
        let creator = self.legacy_creator.read().expect("lock poisoned").clone();
        if let Some(creator) = creator {
            if let Some(current_name) = creator.resolve_type_name(stored)? {
                debug!(
                    type_id = %stored.type_id,
                    old_name = %stored.type_name,
                    current_name = %current_name,
                    "stored type renamed"
                );
                return self.ensure_type_handler(&current_name);
            }
        }
        Err(HandlerError::UnknownRuntimeType(stored.type_name.clone()))
    }

    fn create_legacy_handler(
        &self,
        stored: Arc<TypeDefinition>,
        current: Arc<dyn TypeHandler>,
    ) -> HandlerResult<Arc<dyn TypeHandler>> {
        let mismatch = |reason: &str| HandlerError::SchemaMismatch {
            type_name: stored.type_name.clone(),
            old_type_id: stored.type_id,
            current_type_id: current.type_id(),
            reason: reason.to_string(),
        };
        if !matches!(
            current.runtime_type().shape(),
            TypeShape::Record(_) | TypeShape::Enum(_)
        ) {
            return Err(mismatch("built-in layout changed"));
        }
        let creator = self.legacy_creator.read().expect("lock poisoned").clone();
        let Some(creator) = creator else {
            return Err(mismatch("no legacy type resolver installed"));
        };

        info!(
            old_type_id = %stored.type_id,
            current_type_id = %current.type_id(),
            type_name = %current.type_name(),
            "creating legacy type handler"
        );
        creator.create_legacy_handler(stored, current)
    }

    /// Enum constant by type and constant name.
    pub fn enum_constant(&self, type_name: &str, constant: &str) -> HandlerResult<Option<ObjRef>> {
        Ok(self.ensure_type_handler(type_name)?.constant(constant))
    }

    /// Current handlers ordered by type id.
    pub fn handlers(&self) -> Vec<Arc<dyn TypeHandler>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_id
            .values()
            .cloned()
            .collect()
    }

    /// Number of cached alias and legacy handlers.
    pub fn derived_len(&self) -> usize {
        self.derived.lock().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("TypeHandlerRegistry")
            .field("runtime_types", &state.runtime_types.len())
            .field("handlers", &state.by_id.len())
            .field("derived", &self.derived_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_dictionary::MemberKind;
    use objgraph_model::MemberDescriptor;
    use objgraph_types::{PrimitiveKind, SequentialIdAllocator};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> TypeHandlerRegistry {
        TypeHandlerRegistry::new(
            Arc::new(TypeDictionary::new()),
            Arc::new(SequentialIdAllocator::new()),
        )
    }

    fn point(members: &[&str]) -> RuntimeType {
        RuntimeType::record(
            "app.Point",
            members
                .iter()
                .map(|m| MemberDescriptor::primitive(*m, PrimitiveKind::I32))
                .collect(),
        )
    }

    #[test]
    fn handlers_are_created_once() {
        let reg = registry();
        reg.register_type(point(&["x", "y"])).unwrap();
        let a = reg.ensure_type_handler("app.Point").unwrap();
        let b = reg.ensure_type_handler("app.Point").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.type_id(), TypeId::from_raw(1_000_000));
        assert_eq!(reg.dictionary().pending_definitions().len(), 1);
        assert_eq!(reg.handlers().len(), 1);
        assert!(reg.lookup_type_handler("app.Other").is_none());
    }

    #[test]
    fn redefinition_is_rejected() {
        let reg = registry();
        reg.register_type(point(&["x"])).unwrap();
        assert!(reg.register_type(point(&["x"])).is_ok());
        assert!(matches!(
            reg.register_type(point(&["x", "y"])),
            Err(HandlerError::TypeRedefined { .. })
        ));
        assert!(matches!(
            reg.register_type(RuntimeType::record("core.Text", vec![])),
            Err(HandlerError::TypeRedefined { .. })
        ));
    }

    #[test]
    fn stored_description_is_reused() {
        let dictionary = Arc::new(TypeDictionary::new());
        dictionary
            .import_definitions([TypeDefinition::new(
                TypeId::from_raw(1_000_042),
                "app.Point",
                vec![
                    TypeMember::new("x", MemberKind::Primitive(PrimitiveKind::I32)),
                    TypeMember::new("y", MemberKind::Primitive(PrimitiveKind::I32)),
                ],
            )])
            .unwrap();
        let reg = TypeHandlerRegistry::new(dictionary, Arc::new(SequentialIdAllocator::new()));
        reg.register_type(point(&["x", "y"])).unwrap();
        let handler = reg.ensure_type_handler("app.Point").unwrap();
        assert_eq!(handler.type_id(), TypeId::from_raw(1_000_042));
        assert!(reg.dictionary().pending_definitions().is_empty());
    }

    #[test]
    fn instances_register_their_type() {
        let reg = registry();
        let text = ObjRef::text("hi");
        let handler = reg.handler_for_instance(&text).unwrap();
        assert_eq!(handler.type_name(), "core.Text");

        let ty = Arc::new(point(&["x"]));
        let p = ObjRef::blank(ty);
        reg.handler_for_instance(&p).unwrap();
        let other = ObjRef::blank(Arc::new(point(&["x", "z"])));
        assert!(matches!(
            reg.handler_for_instance(&other),
            Err(HandlerError::TypeRedefined { .. })
        ));
    }

    #[test]
    fn old_definition_without_resolver_is_a_mismatch() {
        let reg = registry();
        reg.dictionary()
            .import_definitions([TypeDefinition::new(
                TypeId::from_raw(1_000_500),
                "app.Point",
                vec![TypeMember::new("x", MemberKind::Primitive(PrimitiveKind::I64))],
            )])
            .unwrap();
        reg.register_type(point(&["x"])).unwrap();
        assert!(matches!(
            reg.handler_for_type_id(TypeId::from_raw(1_000_500)),
            Err(HandlerError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            reg.handler_for_type_id(TypeId::from_raw(77)),
            Err(HandlerError::UnknownTypeId(_))
        ));
    }

    #[test]
    fn identical_layout_under_another_id_is_aliased() {
        let reg = registry();
        reg.register_type(point(&["x"])).unwrap();
        let current = reg.ensure_type_handler("app.Point").unwrap();
        let members = current.definition().members.clone();
        reg.dictionary()
            .import_definitions([TypeDefinition::new(
                TypeId::from_raw(1_000_900),
                "app.Point",
                members,
            )])
            .unwrap();
        let alias = reg.handler_for_type_id(TypeId::from_raw(1_000_900)).unwrap();
        assert_eq!(alias.type_id(), TypeId::from_raw(1_000_900));
        assert!(Arc::ptr_eq(alias.runtime_type(), current.runtime_type()));
        assert_eq!(reg.derived_len(), 1);
    }

    struct CountingCreator(AtomicUsize);

    impl LegacyTypeHandlerCreator for CountingCreator {
        fn resolve_type_name(&self, old: &TypeDefinition) -> HandlerResult<Option<String>> {
            Ok((old.type_name == "app.OldPoint").then(|| "app.Point".to_string()))
        }

        fn create_legacy_handler(
            &self,
            old: Arc<TypeDefinition>,
            current: Arc<dyn TypeHandler>,
        ) -> HandlerResult<Arc<dyn TypeHandler>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(AliasHandler::new(old, current)))
        }
    }

    #[test]
    fn legacy_handlers_are_built_once() {
        let reg = Arc::new(registry());
        let creator = Arc::new(CountingCreator(AtomicUsize::new(0)));
        reg.set_legacy_creator(creator.clone());
        reg.register_type(point(&["x"])).unwrap();
        reg.dictionary()
            .import_definitions([TypeDefinition::new(
                TypeId::from_raw(1_000_300),
                "app.OldPoint",
                vec![TypeMember::new("x", MemberKind::Primitive(PrimitiveKind::I64))],
            )])
            .unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.handler_for_type_id(TypeId::from_raw(1_000_300))
                        .unwrap()
                        .type_id()
                })
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), TypeId::from_raw(1_000_300));
        }
        assert_eq!(creator.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enum_constants_by_name() {
        let reg = registry();
        reg.register_type(RuntimeType::enumeration("app.Color", ["RED", "GREEN"]))
            .unwrap();
        let red = reg.enum_constant("app.Color", "RED").unwrap().unwrap();
        assert!(red.ptr_eq(&reg.enum_constant("app.Color", "RED").unwrap().unwrap()));
        assert!(reg.enum_constant("app.Color", "PINK").unwrap().is_none());
    }
}
