use crate::path::SourcePath;
use refbroker_lexer::NAMESPACE_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Kind of a structural entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Namespace,
    Class,
    Function,
    Constant,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [
        Self::Namespace,
        Self::Class,
        Self::Function,
        Self::Constant,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Function => "function",
            Self::Constant => "constant",
        }
    }

    pub(crate) const fn slot(self) -> usize {
        match self {
            Self::Namespace => 0,
            Self::Class => 1,
            Self::Function => 2,
            Self::Constant => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entity's definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityOrigin {
    /// Declared in a processed source unit
    Source,
    /// Declared outside any source unit (built into the runtime)
    Internal,
    /// Looked up but never declared; cached negative result
    Missing,
}

/// Flavor of a class-like declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassFlavor {
    Class,
    Interface,
    Trait,
}

bitflags::bitflags! {
    /// Class categories requested from bulk class listing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFilter: u8 {
        /// Classes declared in processed source units
        const TOKENIZED = 1 << 0;
        /// Externally declared classes
        const INTERNAL = 1 << 1;
        const ALL = Self::TOKENIZED.bits() | Self::INTERNAL.bits();
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::TOKENIZED
    }
}

impl ClassFilter {
    #[must_use]
    pub fn accepts(self, entity: &Entity) -> bool {
        match entity.origin {
            EntityOrigin::Source => self.contains(Self::TOKENIZED),
            EntityOrigin::Internal => self.contains(Self::INTERNAL),
            EntityOrigin::Missing => false,
        }
    }
}

/// A declared namespace, class, function or constant
#[derive(Debug)]
pub struct Entity {
    pub kind: EntityKind,

    /// Qualified name without a leading separator (`App\Model\User`)
    pub name: String,

    pub origin: EntityOrigin,

    /// Unit that declared the entity; `None` for internal and missing ones
    pub unit: Option<SourcePath>,

    /// First line of the declaration (1-indexed, 0 when unknown)
    pub start_line: u32,

    /// Last line of the declaration (inclusive)
    pub end_line: u32,

    pub doc_comment: Option<String>,

    /// Classes only
    pub flavor: Option<ClassFlavor>,

    /// Resolved parent class names (`extends`)
    pub parents: Vec<String>,

    /// Resolved interface names (`implements`)
    pub interfaces: Vec<String>,

    tokenized: AtomicBool,
}

impl Entity {
    fn with_origin(
        kind: EntityKind,
        name: String,
        origin: EntityOrigin,
        unit: Option<SourcePath>,
    ) -> Self {
        Self {
            kind,
            name,
            origin,
            tokenized: AtomicBool::new(origin == EntityOrigin::Source),
            unit,
            start_line: 0,
            end_line: 0,
            doc_comment: None,
            flavor: None,
            parents: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    /// Entity declared in `unit`
    pub fn declared(kind: EntityKind, name: impl Into<String>, unit: SourcePath) -> Self {
        Self::with_origin(kind, name.into(), EntityOrigin::Source, Some(unit))
    }

    /// Externally declared class; never tokenized
    pub fn internal_class(name: impl Into<String>) -> Self {
        Self::with_origin(EntityKind::Class, name.into(), EntityOrigin::Internal, None)
            .flavor(ClassFlavor::Class)
    }

    /// Placeholder for a class that was looked up but does not exist
    pub fn missing_class(name: impl Into<String>) -> Self {
        Self::with_origin(EntityKind::Class, name.into(), EntityOrigin::Missing, None)
    }

    #[must_use]
    pub const fn lines(mut self, start_line: u32, end_line: u32) -> Self {
        self.start_line = start_line;
        self.end_line = end_line;
        self
    }

    #[must_use]
    pub fn doc_comment(mut self, doc: Option<String>) -> Self {
        self.doc_comment = doc;
        self
    }

    #[must_use]
    pub fn flavor(mut self, flavor: ClassFlavor) -> Self {
        self.flavor = Some(flavor);
        self
    }

    /// Whether the owning unit's tokens are still held in memory
    #[must_use]
    pub fn is_tokenized(&self) -> bool {
        self.tokenized.load(Ordering::Acquire)
    }

    /// Downgrade to a placeholder once the owning unit's tokens are dropped.
    ///
    /// Visible through every shared reference to this entity.
    pub fn mark_placeholder(&self) {
        self.tokenized.store(false, Ordering::Release);
    }

    /// A cached negative lookup rather than a real entity
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.origin == EntityOrigin::Missing
    }

    /// Name without its namespace
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name
            .rsplit(NAMESPACE_SEPARATOR)
            .next()
            .unwrap_or(&self.name)
    }

    /// Namespace part of the name; empty for the global namespace
    #[must_use]
    pub fn namespace_name(&self) -> &str {
        if self.kind == EntityKind::Namespace {
            return &self.name;
        }
        self.name
            .rfind(NAMESPACE_SEPARATOR)
            .map_or("", |idx| &self.name[..idx])
    }
}

/// Strip the leading separator a fully-qualified name may be written with
#[must_use]
pub fn normalize_name(name: &str) -> &str {
    name.trim_start_matches(NAMESPACE_SEPARATOR)
}

/// Entities built from one token stream
#[derive(Debug)]
pub struct SourceUnitReflection {
    pub path: SourcePath,

    /// Number of tokens the unit was built from
    pub token_count: usize,

    /// Declared entities in source order
    pub entities: Vec<Arc<Entity>>,
}

impl SourceUnitReflection {
    #[must_use]
    pub const fn new(path: SourcePath, token_count: usize) -> Self {
        Self {
            path,
            token_count,
            entities: Vec::new(),
        }
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(Arc::new(entity));
    }

    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.entities.iter().filter(move |entity| entity.kind == kind)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.entities_of(EntityKind::Namespace)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.entities_of(EntityKind::Class)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.entities_of(EntityKind::Function)
    }

    pub fn constants(&self) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.entities_of(EntityKind::Constant)
    }

    /// Find a declared entity by kind and qualified name
    #[must_use]
    pub fn find(&self, kind: EntityKind, name: &str) -> Option<&Arc<Entity>> {
        let name = normalize_name(name);
        self.entities_of(kind).find(|entity| entity.name == name)
    }
}
