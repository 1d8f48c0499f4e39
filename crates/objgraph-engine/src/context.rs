use std::sync::Arc;

use objgraph_handler::TypeHandlerRegistry;
use objgraph_registry::ObjectRegistry;
use objgraph_store::PersistenceChannel;
use objgraph_types::IdAllocator;

/// Collaborators shared by every storer and loader of one persistence.
pub(crate) struct EngineContext {
    pub(crate) objects: Arc<ObjectRegistry>,
    pub(crate) handlers: Arc<TypeHandlerRegistry>,
    pub(crate) allocator: Arc<dyn IdAllocator>,
    pub(crate) channel: Arc<dyn PersistenceChannel>,
    pub(crate) max_batch_bytes: u64,
}
