use refbroker::{
    ClassFlavor, Entity, EntityKind, EntityOrigin, ProcessStats, SourcePath, SourceUnitReflection,
};
use serde::Serialize;
use std::sync::Arc;

/// JSON document printed by `refbroker process`
#[derive(Debug, Serialize)]
pub struct ProcessReport {
    pub target: String,
    pub units: Vec<UnitSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<EntitySummary>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<EntitySummary>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constants: Option<Vec<EntitySummary>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lookups: Vec<LookupResult>,

    pub stats: ProcessStats,
}

#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub path: SourcePath,
    pub tokens: usize,
    pub namespaces: usize,
    pub classes: usize,
    pub functions: usize,
    pub constants: usize,
}

impl UnitSummary {
    pub fn new(unit: &Arc<SourceUnitReflection>) -> Self {
        Self {
            path: unit.path.clone(),
            tokens: unit.token_count,
            namespaces: unit.namespaces().count(),
            classes: unit.classes().count(),
            functions: unit.functions().count(),
            constants: unit.constants().count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntitySummary {
    pub kind: EntityKind,
    pub name: String,
    pub origin: EntityOrigin,
    pub tokenized: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<SourcePath>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<[u32; 2]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<ClassFlavor>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
}

impl EntitySummary {
    pub fn new(entity: &Entity) -> Self {
        Self {
            kind: entity.kind,
            name: entity.name.clone(),
            origin: entity.origin,
            tokenized: entity.is_tokenized(),
            unit: entity.unit.clone(),
            lines: (entity.start_line > 0).then_some([entity.start_line, entity.end_line]),
            flavor: entity.flavor,
            parents: entity.parents.clone(),
            interfaces: entity.interfaces.clone(),
        }
    }

    pub fn list(entities: &[Arc<Entity>]) -> Vec<Self> {
        entities.iter().map(|entity| Self::new(entity)).collect()
    }
}

/// Outcome of one `--lookup-*` flag
#[derive(Debug, Serialize)]
pub struct LookupResult {
    pub kind: EntityKind,
    pub name: String,
    pub found: Option<EntitySummary>,
}
