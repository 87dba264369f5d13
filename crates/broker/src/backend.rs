use crate::entity::{ClassFilter, Entity, EntityKind, SourceUnitReflection};
use crate::error::BackendError;
use crate::path::SourcePath;
use refbroker_lexer::TokenStream;
use std::sync::Arc;

/// Durable owner of processed units and the entity index.
///
/// The broker never owns entities itself: it caches the `Arc`s a backend
/// hands out. Implementations that are shared between brokers are
/// responsible for their own synchronization.
pub trait Backend {
    /// Whether `path` has already been registered
    fn is_unit_processed(&self, path: &SourcePath) -> bool;

    /// Token stream kept for `path`, if streams are retained
    fn stored_token_stream(&self, path: &SourcePath) -> Result<Arc<TokenStream>, BackendError>;

    /// Reflection registered for `path`
    fn unit(&self, path: &SourcePath) -> Option<Arc<SourceUnitReflection>>;

    /// Take ownership of a freshly built unit and index its entities
    fn register_unit(
        &mut self,
        unit: SourceUnitReflection,
        tokens: Arc<TokenStream>,
    ) -> Result<Arc<SourceUnitReflection>, BackendError>;

    /// Indexed lookup by qualified name (no leading separator)
    fn lookup(&self, kind: EntityKind, name: &str) -> Option<Arc<Entity>>;

    fn all_classes(&self, filter: ClassFilter) -> Vec<Arc<Entity>>;

    fn all_functions(&self) -> Vec<Arc<Entity>>;

    fn all_constants(&self) -> Vec<Arc<Entity>>;

    /// Whether token streams survive after building
    fn retains_token_streams(&self) -> bool;

    fn lookup_namespace(&self, name: &str) -> Option<Arc<Entity>> {
        self.lookup(EntityKind::Namespace, name)
    }

    fn lookup_class(&self, name: &str) -> Option<Arc<Entity>> {
        self.lookup(EntityKind::Class, name)
    }

    fn lookup_function(&self, name: &str) -> Option<Arc<Entity>> {
        self.lookup(EntityKind::Function, name)
    }

    fn lookup_constant(&self, name: &str) -> Option<Arc<Entity>> {
        self.lookup(EntityKind::Constant, name)
    }
}
