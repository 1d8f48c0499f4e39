use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use objgraph_dictionary::{RefactoringMapping, TypeDictionary};
use objgraph_handler::TypeHandlerRegistry;
use objgraph_legacy::{
    ConvertibleValidator, LegacyTypeResolver, LoggingResultor, MappingResultor, MemberMatcher,
    StrictResultor, TypeSimilarity,
};
use objgraph_model::{ModelError, ObjRef, RuntimeType};
use objgraph_registry::ObjectRegistry;
use objgraph_store::{FileChannel, InMemoryChannel, PersistenceChannel};
use objgraph_types::{IdAllocator, ObjectId, SequentialIdAllocator};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::loader::Loader;
use crate::root::{root_type, ROOT_MEMBER};
use crate::storer::{CommitSummary, Storer, StorerMode};

/// Assembles a [`Persistence`] from a configuration and optional overrides.
///
/// Anything not overridden is derived from the [`PersistenceConfig`]: a
/// [`FileChannel`] when a storage directory is configured, an
/// [`InMemoryChannel`] otherwise.
#[derive(Default)]
pub struct PersistenceBuilder {
    config: PersistenceConfig,
    allocator: Option<Arc<dyn IdAllocator>>,
    channel: Option<Arc<dyn PersistenceChannel>>,
    refactoring: Option<RefactoringMapping>,
    resultor: Option<Arc<dyn MappingResultor>>,
    types: Vec<Arc<RuntimeType>>,
}

impl PersistenceBuilder {
    pub fn config(mut self, config: PersistenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Store in `directory`, overriding the configured one.
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.storage.directory = Some(directory.into());
        self
    }

    pub fn allocator(mut self, allocator: Arc<dyn IdAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Use `channel` instead of the configured storage.
    pub fn channel(mut self, channel: Arc<dyn PersistenceChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Use `mapping` instead of the configured refactoring file.
    pub fn refactoring(mut self, mapping: RefactoringMapping) -> Self {
        self.refactoring = Some(mapping);
        self
    }

    pub fn resultor(mut self, resultor: Arc<dyn MappingResultor>) -> Self {
        self.resultor = Some(resultor);
        self
    }

    /// Register a runtime type before stored data is read.
    pub fn register_type(mut self, runtime: impl Into<Arc<RuntimeType>>) -> Self {
        self.types.push(runtime.into());
        self
    }

    /// Open the persistence: read the stored type dictionary, move the id
    /// allocator past every stored id and load the persistent root.
    pub fn build(self) -> EngineResult<Persistence> {
        let config = self.config;
        let allocator = self.allocator.unwrap_or_else(|| {
            Arc::new(SequentialIdAllocator::starting_at(
                config.ids.first_object_id,
                config.ids.first_type_id,
            ))
        });
        let channel: Arc<dyn PersistenceChannel> = match (self.channel, &config.storage.directory) {
            (Some(channel), _) => channel,
            (None, Some(directory)) => {
                Arc::new(FileChannel::open(directory, config.storage.file_channel())?)
            }
            (None, None) => Arc::new(InMemoryChannel::new()),
        };

        let dictionary = Arc::new(TypeDictionary::new());
        let imported = dictionary.import_text(&channel.read_type_dictionary()?)?;
        if let Some(highest) = dictionary.highest_type_id() {
            allocator.advance_type_id(highest);
        }
        if let Some(highest) = channel.highest_object_id()? {
            allocator.advance_object_id(highest);
        }

        let refactoring = match (self.refactoring, &config.legacy.refactoring_file) {
            (Some(mapping), _) => mapping,
            (None, Some(path)) => RefactoringMapping::load(path)?,
            (None, None) => RefactoringMapping::new(),
        };
        let resultor = self.resultor.unwrap_or_else(|| -> Arc<dyn MappingResultor> {
            if config.legacy.strict {
                Arc::new(StrictResultor)
            } else {
                Arc::new(LoggingResultor)
            }
        });
        let resolver = LegacyTypeResolver::new(Arc::new(refactoring))
            .with_type_similarity(
                TypeSimilarity::default().with_entries(&config.legacy.type_similarities),
            )
            .with_matcher(MemberMatcher::new(
                config.legacy.similarity_threshold,
                Arc::new(ConvertibleValidator),
            ))
            .with_resultor(resultor);

        let handlers = Arc::new(TypeHandlerRegistry::new(
            Arc::clone(&dictionary),
            Arc::clone(&allocator),
        ));
        handlers.set_legacy_creator(Arc::new(resolver));
        let root_type = handlers.register_type(root_type())?;
        for runtime in self.types {
            handlers.register_type(runtime)?;
        }

        let ctx = Arc::new(EngineContext {
            objects: Arc::new(ObjectRegistry::new()),
            handlers,
            allocator,
            channel,
            max_batch_bytes: config.storer.max_batch_bytes,
        });

        let holder = match Loader::new(Arc::clone(&ctx)).get(ObjectId::ROOT) {
            Ok(holder) => holder,
            Err(EngineError::ObjectNotFound(_)) => ObjRef::blank(Arc::clone(&root_type)),
            Err(e) => return Err(e),
        };
        let root = holder.get_ref(ROOT_MEMBER)?;
        info!(
            types = imported,
            next_object_id = %ctx.allocator.current_object_id(),
            root = root.as_ref().map(|r| r.type_name()).unwrap_or("none"),
            "persistence opened"
        );

        Ok(Persistence {
            ctx,
            config,
            holder: Mutex::new(holder),
        })
    }
}

/// Entry point to one persistent object graph.
///
/// Owns the object registry, type dictionary, type handler registry and
/// storage channel, and hands out [`Storer`]s and [`Loader`]s that share
/// them. All methods take `&self`; a `Persistence` can be shared between
/// threads behind an `Arc`.
pub struct Persistence {
    ctx: Arc<EngineContext>,
    config: PersistenceConfig,
    /// Holder record bound to [`ObjectId::ROOT`].
    holder: Mutex<ObjRef>,
}

impl Persistence {
    pub fn builder() -> PersistenceBuilder {
        PersistenceBuilder::default()
    }

    /// A persistence that keeps its data in memory.
    pub fn in_memory() -> EngineResult<Self> {
        Self::builder().build()
    }

    pub fn register_type(&self, runtime: impl Into<Arc<RuntimeType>>) -> EngineResult<Arc<RuntimeType>> {
        Ok(self.ctx.handlers.register_type(runtime)?)
    }

    /// The process-wide instance of an enum constant.
    pub fn enum_constant(&self, type_name: &str, constant: &str) -> EngineResult<ObjRef> {
        self.ctx
            .handlers
            .enum_constant(type_name, constant)?
            .ok_or_else(|| {
                ModelError::UnknownConstant {
                    type_name: type_name.to_string(),
                    constant: constant.to_string(),
                }
                .into()
            })
    }

    pub fn create_storer(&self) -> Storer {
        Storer::new(Arc::clone(&self.ctx), StorerMode::Lazy)
    }

    pub fn create_eager_storer(&self) -> Storer {
        Storer::new(Arc::clone(&self.ctx), StorerMode::Eager)
    }

    /// Store `instance` and everything new it references in one commit.
    pub fn store(&self, instance: &ObjRef) -> EngineResult<ObjectId> {
        let mut storer = self.create_storer();
        let object_id = storer.store(instance)?;
        storer.commit()?;
        Ok(object_id)
    }

    pub fn store_all(&self, instances: &[ObjRef]) -> EngineResult<Vec<ObjectId>> {
        let mut storer = self.create_storer();
        let object_ids = storer.store_all(instances)?;
        storer.commit()?;
        Ok(object_ids)
    }

    pub fn create_loader(&self) -> Loader {
        Loader::new(Arc::clone(&self.ctx))
    }

    pub fn get(&self, object_id: ObjectId) -> EngineResult<ObjRef> {
        self.create_loader().get(object_id)
    }

    pub fn get_typed(&self, object_id: ObjectId, type_name: &str) -> EngineResult<ObjRef> {
        self.create_loader().get_typed(object_id, type_name)
    }

    /// Make `root` the persistent root and store it.
    ///
    /// The root itself is always written; what it references is written if
    /// new. On failure the previous root stays in place.
    pub fn set_root(&self, root: Option<&ObjRef>) -> EngineResult<CommitSummary> {
        let holder = self.holder.lock().expect("lock poisoned");
        let previous = holder.get(ROOT_MEMBER)?;
        holder.set(ROOT_MEMBER, root.cloned())?;

        let mut storer = self.create_storer();
        let result = storer
            .store_with_id(&holder, ObjectId::ROOT)
            .and_then(|_| match root {
                Some(root) => storer.store(root).map(|_| ()),
                None => Ok(()),
            })
            .and_then(|()| storer.commit());
        match result {
            Ok(summary) => {
                debug!(
                    root = root.map(|r| r.type_name()).unwrap_or("none"),
                    records = summary.records,
                    "root updated"
                );
                Ok(summary)
            }
            Err(e) => {
                holder.set(ROOT_MEMBER, previous)?;
                Err(e)
            }
        }
    }

    pub fn root(&self) -> Option<ObjRef> {
        self.holder
            .lock()
            .expect("lock poisoned")
            .get_ref(ROOT_MEMBER)
            .ok()
            .flatten()
    }

    /// Object id bound to a live instance, if it has been stored or loaded.
    pub fn object_id(&self, instance: &ObjRef) -> Option<ObjectId> {
        self.ctx.objects.lookup_object_id(instance)
    }

    pub fn type_dictionary(&self) -> &Arc<TypeDictionary> {
        self.ctx.handlers.dictionary()
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.ctx.objects
    }

    pub fn type_handlers(&self) -> &Arc<TypeHandlerRegistry> {
        &self.ctx.handlers
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("objects", &self.ctx.objects.len())
            .field("types", &self.type_dictionary().len())
            .field("directory", &self.config.storage.directory)
            .finish()
    }
}
