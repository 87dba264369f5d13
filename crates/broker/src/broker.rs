use crate::archive::{archive_support_available, ArchiveMount};
use crate::backend::Backend;
use crate::builder::{DeclarationBuilder, EntityBuilder};
use crate::cache::ReflectionCache;
use crate::config::BrokerConfig;
use crate::discovery::{SourceDiscovery, SourceFiles, SourceShape};
use crate::entity::{normalize_name, ClassFilter, Entity, EntityKind, SourceUnitReflection};
use crate::error::{BackendError, BrokerError, Result};
use crate::memory_backend::MemoryBackend;
use crate::path::{get_real_path, has_archive_scheme, resolve_fs, SourcePath};
use crate::provider::{FileTokenizer, TokenStreamProvider};
use crate::stats::ProcessStats;
use refbroker_lexer::TokenStream;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Units produced by one processing call, keyed by path
pub type ProcessedUnits = BTreeMap<SourcePath, Arc<SourceUnitReflection>>;

/// Result of [`Broker::process`]
#[derive(Debug, Clone)]
pub enum Processed {
    /// The target was a single unit
    Unit(Arc<SourceUnitReflection>),
    /// The target was a directory or an archive bundle
    Units(ProcessedUnits),
}

impl Processed {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Unit(_) => 1,
            Self::Units(units) => units.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every unit, in path order
    #[must_use]
    pub fn units(&self) -> Vec<&Arc<SourceUnitReflection>> {
        match self {
            Self::Unit(unit) => vec![unit],
            Self::Units(units) => units.values().collect(),
        }
    }

    #[must_use]
    pub fn into_units(self) -> ProcessedUnits {
        match self {
            Self::Unit(unit) => BTreeMap::from([(unit.path.clone(), unit)]),
            Self::Units(units) => units,
        }
    }
}

/// Orchestrates discovery, tokenizing, building and lookup of source units.
///
/// A broker is single-threaded: it owns its [`ReflectionCache`] exclusively
/// and every operation runs to completion before returning. Each path is
/// tokenized at most once per broker.
pub struct Broker {
    config: BrokerConfig,
    backend: Box<dyn Backend>,
    provider: Box<dyn TokenStreamProvider>,
    builder: Box<dyn EntityBuilder>,
    cache: ReflectionCache,
    stats: ProcessStats,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl Broker {
    /// Broker over an in-memory backend, the file tokenizer and the declaration builder
    pub fn new(config: BrokerConfig) -> Self {
        let backend = MemoryBackend::new(config.retain_token_streams)
            .with_max_tokenized_units(config.max_tokenized_units);
        Self::with_components(
            config,
            Box::new(backend),
            Box::new(FileTokenizer::default()),
            Box::new(DeclarationBuilder),
        )
    }

    pub fn with_components(
        config: BrokerConfig,
        backend: Box<dyn Backend>,
        provider: Box<dyn TokenStreamProvider>,
        builder: Box<dyn EntityBuilder>,
    ) -> Self {
        Self {
            config,
            backend,
            provider,
            builder,
            cache: ReflectionCache::new(),
            stats: ProcessStats::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    pub fn cache(&self) -> &ReflectionCache {
        &self.cache
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Process a file, directory or archive bundle.
    ///
    /// Bundles that turn out to be structurally invalid archives are
    /// processed as a single source file instead.
    pub fn process(&mut self, path: impl AsRef<Path>) -> Result<Processed> {
        let shape = SourceDiscovery::new(&self.config).classify(path.as_ref())?;
        match shape {
            SourceShape::File(unit) => self.process_source(&unit).map(Processed::Unit),
            SourceShape::Directory(dir) => self.process_directory(&dir).map(Processed::Units),
            SourceShape::Archive { archive, prefix } => {
                match self.process_archive_members(&archive, &prefix) {
                    Ok(units) => Ok(Processed::Units(units)),
                    Err(BrokerError::Archive { source, .. })
                        if source.is_malformed() && prefix.is_empty() =>
                    {
                        log::debug!(
                            "{} is not a valid archive ({source}); processing as a single file",
                            archive.display()
                        );
                        self.process_source(&SourcePath::from_fs(&archive))
                            .map(Processed::Unit)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Process one source unit; repeated calls never tokenize it again
    pub fn process_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<SourceUnitReflection>> {
        let raw = path.as_ref();
        if has_archive_scheme(&raw.to_string_lossy()) {
            let unit = get_real_path(raw)
                .ok_or_else(|| BrokerError::target_not_found(raw.to_string_lossy()))?;
            return self.process_source(&unit);
        }
        let unit = resolve_fs(raw)?;
        self.process_source(&unit)
    }

    /// Process every file below `path`, stopping at the first failure
    pub fn process_directory(&mut self, path: impl AsRef<Path>) -> Result<ProcessedUnits> {
        let raw = path.as_ref();
        let dir = resolve_fs(raw)?;
        if !Path::new(dir.as_str()).is_dir() {
            return Err(BrokerError::target_not_found(raw.to_string_lossy()));
        }

        let files = SourceDiscovery::new(&self.config).directory_files(Path::new(dir.as_str()));
        self.process_all(&dir, files)
    }

    /// Process every member of an archive bundle, stopping at the first failure
    pub fn process_archive(&mut self, path: impl AsRef<Path>) -> Result<ProcessedUnits> {
        let raw = path.as_ref();
        if !raw.is_file() {
            return Err(BrokerError::target_not_found(raw.to_string_lossy()));
        }
        if !archive_support_available() {
            return Err(BrokerError::UnsupportedFormat {
                path: raw.to_string_lossy().into_owned(),
                reason: "archive support is not compiled in".to_string(),
            });
        }
        let archive = resolve_fs(raw)?;
        self.process_archive_members(Path::new(archive.as_str()), "")
    }

    fn process_archive_members(&mut self, archive: &Path, prefix: &str) -> Result<ProcessedUnits> {
        let mount =
            ArchiveMount::open(archive).map_err(|source| BrokerError::archive(archive, source))?;

        let files = SourceDiscovery::new(&self.config).archive_files(&mount, prefix);
        let container = SourcePath::archive_member(archive, prefix);
        self.process_all(&container, files)
    }

    fn process_all(&mut self, container: &SourcePath, files: SourceFiles) -> Result<ProcessedUnits> {
        let mut units = ProcessedUnits::new();
        let failed = |err: BrokerError| BrokerError::processing_failed(container.as_str(), err);
        for file in files {
            let file = file.map_err(failed)?;
            let unit = self.process_source(&file).map_err(failed)?;
            units.insert(file, unit);
        }
        log::info!("Processed {} units from {container}", units.len());
        Ok(units)
    }

    fn process_source(&mut self, path: &SourcePath) -> Result<Arc<SourceUnitReflection>> {
        if self.backend.is_unit_processed(path) {
            return self.reuse_processed(path);
        }

        let tokens = self
            .provider
            .tokenize(path)
            .map_err(|err| BrokerError::processing_failed(path.as_str(), err))?;
        let tokens = Arc::new(tokens);
        let unit = self
            .builder
            .build(path, &tokens)
            .map_err(|err| BrokerError::processing_failed(path.as_str(), err))?;

        let entities = unit.entities.len();
        let unit = self
            .backend
            .register_unit(unit, tokens)
            .map_err(|err| BrokerError::processing_failed(path.as_str(), err))?;
        self.stats.add_unit(entities);
        log::debug!("Processed {path} ({entities} entities)");

        self.prune_cache();
        Ok(unit)
    }

    fn reuse_processed(&mut self, path: &SourcePath) -> Result<Arc<SourceUnitReflection>> {
        if let Some(unit) = self.backend.unit(path) {
            self.stats.units_reused += 1;
            log::debug!("{path} already processed");
            return Ok(unit);
        }

        let tokens = self
            .backend
            .stored_token_stream(path)
            .map_err(|err| BrokerError::processing_failed(path.as_str(), err))?;
        let unit = self
            .builder
            .build(path, &tokens)
            .map_err(|err| BrokerError::processing_failed(path.as_str(), err))?;
        self.stats.units_rebuilt += 1;
        log::debug!("Rebuilt {path} from stored tokens");
        Ok(Arc::new(unit))
    }

    fn prune_cache(&mut self) {
        let pruned = self.cache.prune_untokenized();
        self.stats.add_prune(pruned);
        if pruned > 0 {
            log::debug!("Pruned {pruned} stale cache entries");
        }
    }

    pub fn get_namespace(&mut self, name: &str) -> Option<Arc<Entity>> {
        self.lookup_positive(EntityKind::Namespace, name)
    }

    /// Resolve a class, remembering names that do not exist
    pub fn get_class(&mut self, name: &str) -> Option<Arc<Entity>> {
        let name = normalize_name(name);
        let entity = match self.cache.get(EntityKind::Class, name) {
            Some(cached) => Arc::clone(cached),
            None => {
                self.stats.backend_lookups += 1;
                let resolved = self
                    .backend
                    .lookup_class(name)
                    .unwrap_or_else(|| Arc::new(Entity::missing_class(name)));
                self.cache.insert(EntityKind::Class, name, resolved)
            }
        };
        (!entity.is_missing()).then_some(entity)
    }

    pub fn get_function(&mut self, name: &str) -> Option<Arc<Entity>> {
        self.lookup_positive(EntityKind::Function, name)
    }

    pub fn get_constant(&mut self, name: &str) -> Option<Arc<Entity>> {
        self.lookup_positive(EntityKind::Constant, name)
    }

    /// Cached lookup that only memoizes names the backend knows
    fn lookup_positive(&mut self, kind: EntityKind, name: &str) -> Option<Arc<Entity>> {
        let name = normalize_name(name);
        if let Some(cached) = self.cache.get(kind, name) {
            return Some(Arc::clone(cached));
        }
        self.stats.backend_lookups += 1;
        let entity = self.backend.lookup(kind, name)?;
        Some(self.cache.insert(kind, name, entity))
    }

    /// Token stream the backend kept for an already-processed unit
    pub fn get_file_tokens(&self, path: impl AsRef<Path>) -> Result<Arc<TokenStream>> {
        let raw = path.as_ref();
        let unit = get_real_path(raw).unwrap_or_else(|| SourcePath::from_fs(raw));
        self.backend
            .stored_token_stream(&unit)
            .map_err(|err| match err {
                BackendError::NoStoredTokens { unit } => BrokerError::NoStoredTokens {
                    unit: unit.to_string(),
                },
                other => BrokerError::processing_failed(unit.as_str(), other),
            })
    }

    pub fn get_classes(&self, filter: ClassFilter) -> Vec<Arc<Entity>> {
        self.backend.all_classes(filter)
    }

    pub fn get_functions(&self) -> Vec<Arc<Entity>> {
        self.backend.all_functions()
    }

    pub fn get_constants(&self) -> Vec<Arc<Entity>> {
        self.backend.all_constants()
    }

    /// See [`crate::get_real_path`]
    pub fn get_real_path(&self, path: impl AsRef<Path>) -> Option<SourcePath> {
        get_real_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ProcessingCause};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn processes_a_single_file() {
        let temp = tempdir().unwrap();
        let file = write(
            temp.path(),
            "user.php",
            "<?php\nnamespace App;\nclass User {}\nfunction helper() {}\n",
        );

        let mut broker = Broker::default();
        let processed = broker.process(&file).expect("process");
        assert_eq!(processed.len(), 1);

        let units = processed.units();
        let unit = units[0];
        assert!(unit.find(EntityKind::Class, "App\\User").is_some());
        assert!(broker.get_class("\\App\\User").is_some());
        assert!(broker.get_function("App\\helper").is_some());
        assert!(broker.get_namespace("App").is_some());
        assert_eq!(broker.stats().units_tokenized, 1);
    }

    #[test]
    fn second_process_reuses_the_unit() {
        let temp = tempdir().unwrap();
        let file = write(temp.path(), "a.php", "<?php const A = 1;");

        let mut broker = Broker::default();
        let first = broker.process_file(&file).expect("first");
        let second = broker.process_file(&file).expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.stats().units_tokenized, 1);
        assert_eq!(broker.stats().units_reused, 1);
    }

    #[test]
    fn missing_targets_are_reported() {
        let temp = tempdir().unwrap();
        let mut broker = Broker::default();

        let err = broker.process(temp.path().join("nope.php")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);

        let err = broker
            .process_directory(temp.path().join("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);

        let err = broker.process_archive(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
    }

    #[test]
    fn build_failures_keep_their_cause() {
        let temp = tempdir().unwrap();
        let file = write(temp.path(), "broken.php", "<?php class Broken {");

        let mut broker = Broker::default();
        let err = broker.process_file(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessingFailed);
        assert!(matches!(err.root_cause(), Some(ProcessingCause::Build(_))));
        assert!(err.failed_unit().is_some_and(|unit| unit.ends_with("broken.php")));
        assert!(!broker.backend().is_unit_processed(&get_real_path(&file).unwrap()));
    }

    #[test]
    fn unknown_classes_are_cached_as_missing() {
        let mut broker = Broker::default();

        assert!(broker.get_class("Ghost").is_none());
        assert!(broker.get_class("\\Ghost").is_none());
        assert_eq!(broker.stats().backend_lookups, 1);
        assert_eq!(broker.cache().len(EntityKind::Class), 1);

        assert!(broker.get_constant("GHOST").is_none());
        assert!(broker.get_constant("GHOST").is_none());
        assert_eq!(broker.stats().backend_lookups, 3);
        assert_eq!(broker.cache().len(EntityKind::Constant), 0);
    }

    #[test]
    fn class_declared_after_a_miss_becomes_visible() {
        let temp = tempdir().unwrap();
        let file = write(temp.path(), "late.php", "<?php class Late {}");

        let mut broker = Broker::default();
        assert!(broker.get_class("Late").is_none());

        broker.process_file(&file).expect("process");
        assert!(broker.get_class("Late").is_some());
        assert_eq!(broker.stats().pruned_entries, 1);
    }

    #[test]
    fn tokens_are_served_while_retained() {
        let temp = tempdir().unwrap();
        let file = write(temp.path(), "a.php", "<?php function f() {}");

        let mut broker = Broker::default();
        broker.process_file(&file).expect("process");
        let tokens = broker.get_file_tokens(&file).expect("tokens");
        assert!(!tokens.is_empty());

        let other = write(temp.path(), "b.php", "<?php");
        let err = broker.get_file_tokens(&other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoStoredTokens);
    }

    #[test]
    fn into_units_keys_by_path() {
        let temp = tempdir().unwrap();
        let file = write(temp.path(), "a.php", "<?php");

        let mut broker = Broker::default();
        let units = broker.process(&file).expect("process").into_units();
        let key = get_real_path(&file).unwrap();
        assert!(units.contains_key(&key));
    }
}
