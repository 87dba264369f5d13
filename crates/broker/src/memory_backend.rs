use crate::backend::Backend;
use crate::entity::{ClassFilter, Entity, EntityKind, SourceUnitReflection};
use crate::error::BackendError;
use crate::path::SourcePath;
use indexmap::IndexMap;
use refbroker_lexer::TokenStream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// In-process backend keeping every unit and its index in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    retain_token_streams: bool,
    max_tokenized_units: Option<usize>,
    /// Registration order
    units: IndexMap<SourcePath, Arc<SourceUnitReflection>>,
    tokens: HashMap<SourcePath, Arc<TokenStream>>,
    /// Units whose entities are still tokenized, oldest first
    tokenized: VecDeque<SourcePath>,
    index: [HashMap<String, Arc<Entity>>; 4],
}

impl MemoryBackend {
    pub fn new(retain_token_streams: bool) -> Self {
        Self {
            retain_token_streams,
            ..Self::default()
        }
    }

    /// Keep at most `limit` units tokenized; older ones become placeholders
    #[must_use]
    pub fn with_max_tokenized_units(mut self, limit: Option<usize>) -> Self {
        self.max_tokenized_units = limit;
        self
    }

    /// Register externally declared classes
    #[must_use]
    pub fn with_internal_classes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.declare_internal_class(name);
        }
        self
    }

    /// Make an externally declared class visible to lookups.
    ///
    /// Units declaring the same name are rejected as redeclarations.
    pub fn declare_internal_class(&mut self, name: impl Into<String>) -> Arc<Entity> {
        let entity = Arc::new(Entity::internal_class(name));
        self.index[EntityKind::Class.slot()].insert(entity.name.clone(), Arc::clone(&entity));
        entity
    }

    /// Number of registered units
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Drop the tokens of `path` and downgrade its entities to placeholders.
    ///
    /// Returns false when the unit is unknown or already evicted.
    pub fn evict_unit(&mut self, path: &SourcePath) -> bool {
        let Some(position) = self.tokenized.iter().position(|p| p == path) else {
            return false;
        };
        self.tokenized.remove(position);
        self.release(path);
        true
    }

    fn release(&mut self, path: &SourcePath) {
        self.tokens.remove(path);
        if let Some(unit) = self.units.get(path) {
            for entity in &unit.entities {
                entity.mark_placeholder();
            }
            log::debug!(
                "Evicted {} ({} entities now placeholders)",
                path,
                unit.entities.len()
            );
        }
    }

    fn enforce_limit(&mut self) {
        let Some(limit) = self.max_tokenized_units else {
            return;
        };
        while self.tokenized.len() > limit {
            let Some(oldest) = self.tokenized.pop_front() else {
                break;
            };
            self.release(&oldest);
        }
    }

    fn check_redeclarations(&self, unit: &SourceUnitReflection) -> Result<(), BackendError> {
        for entity in &unit.entities {
            if entity.kind == EntityKind::Namespace {
                continue;
            }
            let Some(existing) = self.index[entity.kind.slot()].get(&entity.name) else {
                continue;
            };
            if existing.unit.as_ref() == Some(&unit.path) {
                continue;
            }
            let existing = existing
                .unit
                .as_ref()
                .map_or_else(|| "internal declarations".to_string(), ToString::to_string);
            return Err(BackendError::Redeclared {
                kind: entity.kind,
                name: entity.name.clone(),
                unit: unit.path.clone(),
                existing,
            });
        }
        Ok(())
    }

    fn sorted(&self, kind: EntityKind, keep: impl Fn(&Entity) -> bool) -> Vec<Arc<Entity>> {
        let mut entities: Vec<Arc<Entity>> = self.index[kind.slot()]
            .values()
            .filter(|entity| keep(entity))
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities
    }
}

impl Backend for MemoryBackend {
    fn is_unit_processed(&self, path: &SourcePath) -> bool {
        self.units.contains_key(path)
    }

    fn stored_token_stream(&self, path: &SourcePath) -> Result<Arc<TokenStream>, BackendError> {
        self.tokens
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NoStoredTokens { unit: path.clone() })
    }

    fn unit(&self, path: &SourcePath) -> Option<Arc<SourceUnitReflection>> {
        self.units.get(path).cloned()
    }

    fn register_unit(
        &mut self,
        unit: SourceUnitReflection,
        tokens: Arc<TokenStream>,
    ) -> Result<Arc<SourceUnitReflection>, BackendError> {
        if let Some(existing) = self.units.get(&unit.path) {
            return Ok(Arc::clone(existing));
        }
        self.check_redeclarations(&unit)?;

        for entity in &unit.entities {
            let slot = &mut self.index[entity.kind.slot()];
            if entity.kind == EntityKind::Namespace {
                // Namespaces span units; keep the first live declaration
                let live = slot.get(&entity.name).is_some_and(|e| e.is_tokenized());
                if live {
                    continue;
                }
            }
            slot.insert(entity.name.clone(), Arc::clone(entity));
        }

        let path = unit.path.clone();
        if self.retain_token_streams {
            self.tokens.insert(path.clone(), tokens);
        }
        let unit = Arc::new(unit);
        self.units.insert(path.clone(), Arc::clone(&unit));
        self.tokenized.push_back(path);
        self.enforce_limit();
        Ok(unit)
    }

    fn lookup(&self, kind: EntityKind, name: &str) -> Option<Arc<Entity>> {
        self.index[kind.slot()].get(name).cloned()
    }

    fn all_classes(&self, filter: ClassFilter) -> Vec<Arc<Entity>> {
        self.sorted(EntityKind::Class, |entity| filter.accepts(entity))
    }

    fn all_functions(&self) -> Vec<Arc<Entity>> {
        self.sorted(EntityKind::Function, |_| true)
    }

    fn all_constants(&self) -> Vec<Arc<Entity>> {
        self.sorted(EntityKind::Constant, |_| true)
    }

    fn retains_token_streams(&self) -> bool {
        self.retain_token_streams
    }
}
