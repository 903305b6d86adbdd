use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::cast::CastOutcome;
use crate::compat::CompatVerdict;
use crate::entity::{GtsConfig, GtsEntity};
use crate::files_reader::FilesReader;
use crate::id::{GtsId, GtsWildcard};
use crate::store::{GtsStore, LoadReport, SchemaGraph};
use crate::validator::Violation;

#[derive(Debug, Clone, Serialize)]
pub struct IdValidationResult {
    pub id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdSegmentsResult {
    pub vendor: String,
    pub package: String,
    pub namespace: Vec<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    pub major: u32,
    pub minor: Option<u32>,
    pub patch: Option<u32>,
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdParseResult {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<IdSegmentsResult>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdMatchResult {
    pub candidate: String,
    pub pattern: String,
    #[serde(rename = "match")]
    pub is_match: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UuidResult {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityInfo {
    pub id: String,
    pub schema_id: String,
    pub is_schema: bool,
    pub source: String,
}

impl EntityInfo {
    fn from_entity(entity: &GtsEntity) -> Self {
        EntityInfo {
            id: entity.id.to_string(),
            schema_id: entity.schema_id().to_string(),
            is_schema: entity.is_schema(),
            source: entity.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityListResult {
    pub entities: Vec<EntityInfo>,
    pub count: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetEntityResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractIdResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    pub is_schema: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstancesOfResult {
    pub schema_id: String,
    pub count: usize,
    pub instances: Vec<EntityInfo>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityResult {
    pub old: String,
    pub new: String,
    pub ok: bool,
    #[serde(flatten)]
    pub verdict: Option<CompatVerdict>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastResult {
    pub from: String,
    pub to: String,
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: Option<CastOutcome>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub count: usize,
    pub limit: usize,
    pub results: Vec<crate::query::QueryHit>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<SchemaGraph>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttrResult {
    pub id: String,
    pub path: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Facade bundling a loaded store with its configuration; the CLI and the
/// HTTP server call these methods and serialize the results as-is.
pub struct GtsOps {
    cfg: GtsConfig,
    store: GtsStore,
}

impl GtsOps {
    /// Loads config (explicit path, `gts.config.json`, or defaults) and
    /// populates the store from the given files and directories.
    #[must_use]
    pub fn new(paths: &[String], config_path: Option<&str>) -> Self {
        let cfg = Self::load_config(config_path);
        let mut reader = FilesReader::new(paths);
        let store = GtsStore::load(&mut reader, cfg.clone());
        GtsOps { cfg, store }
    }

    /// Builds the facade from in-memory documents.
    #[must_use]
    pub fn from_documents(documents: Vec<(String, Value)>, cfg: GtsConfig) -> Self {
        let store = GtsStore::from_documents(documents, cfg.clone());
        GtsOps { cfg, store }
    }

    fn load_config(config_path: Option<&str>) -> GtsConfig {
        let candidates: Vec<&str> = match config_path {
            Some(path) => vec![path],
            None => vec!["gts.config.json"],
        };
        for candidate in candidates {
            let path = Path::new(candidate);
            if let Ok(raw) = fs::read_to_string(path) {
                match serde_json::from_str(&raw) {
                    Ok(cfg) => return cfg,
                    Err(e) => tracing::warn!("ignoring config {}: {}", candidate, e),
                }
            }
        }
        GtsConfig::default()
    }

    #[must_use]
    pub fn config(&self) -> &GtsConfig {
        &self.cfg
    }

    #[must_use]
    pub fn store(&self) -> &GtsStore {
        &self.store
    }

    #[must_use]
    pub fn validate_id(gts_id: &str) -> IdValidationResult {
        match GtsId::parse(gts_id) {
            Ok(id) => IdValidationResult {
                id: id.to_string(),
                valid: true,
                error: String::new(),
            },
            Err(e) => IdValidationResult {
                id: gts_id.to_owned(),
                valid: false,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn parse_id(gts_id: &str) -> IdParseResult {
        match GtsId::parse(gts_id) {
            Ok(id) => IdParseResult {
                id: id.to_string(),
                ok: true,
                segments: Some(IdSegmentsResult {
                    vendor: id.vendor().to_owned(),
                    package: id.package().to_owned(),
                    namespace: id.namespaces().to_vec(),
                    type_name: id.type_name().to_owned(),
                    major: id.version().major,
                    minor: id.version().minor,
                    patch: id.version().patch,
                    instance: id.instance().map(ToString::to_string),
                }),
                error: String::new(),
            },
            Err(e) => IdParseResult {
                id: gts_id.to_owned(),
                ok: false,
                segments: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn match_id_pattern(candidate: &str, pattern: &str) -> IdMatchResult {
        match (GtsId::parse(candidate), GtsWildcard::parse(pattern)) {
            (Ok(id), Ok(wildcard)) => IdMatchResult {
                candidate: candidate.to_owned(),
                pattern: pattern.to_owned(),
                is_match: id.matches(&wildcard),
                error: String::new(),
            },
            (Err(e), _) | (_, Err(e)) => IdMatchResult {
                candidate: candidate.to_owned(),
                pattern: pattern.to_owned(),
                is_match: false,
                error: e.to_string(),
            },
        }
    }

    /// Derives the deterministic UUID, under the configured namespace.
    #[must_use]
    pub fn uuid(&self, gts_id: &str) -> UuidResult {
        match GtsId::parse(gts_id) {
            Ok(id) => UuidResult {
                id: id.to_string(),
                ok: true,
                uuid: Some(id.uuid_in(&self.cfg.uuid_namespace).to_string()),
                error: String::new(),
            },
            Err(e) => UuidResult {
                id: gts_id.to_owned(),
                ok: false,
                uuid: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn extract_id(&self, content: &Value) -> ExtractIdResult {
        match GtsEntity::extract_id(content, &self.cfg) {
            Some(id) => ExtractIdResult {
                ok: true,
                schema_id: id.schema_id().to_string(),
                is_schema: id.is_schema(),
                id: id.to_string(),
            },
            None => ExtractIdResult {
                ok: false,
                id: String::new(),
                schema_id: String::new(),
                is_schema: false,
            },
        }
    }

    #[must_use]
    pub fn validate_instance(&self, gts_id: &str) -> ValidationOutcome {
        match self.store.validate_instance(gts_id) {
            Ok(()) => ValidationOutcome {
                id: gts_id.to_owned(),
                ok: true,
                violations: Vec::new(),
                error: String::new(),
            },
            Err(crate::store::StoreError::SchemaViolation {
                id,
                schema_id,
                violations,
            }) => ValidationOutcome {
                id,
                ok: false,
                violations,
                error: format!("instance violates schema '{schema_id}'"),
            },
            Err(e) => ValidationOutcome {
                id: gts_id.to_owned(),
                ok: false,
                violations: Vec::new(),
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn get_entity(&self, gts_id: &str) -> GetEntityResult {
        match self.store.entity(gts_id) {
            Ok(entity) => GetEntityResult {
                ok: true,
                entity: Some(EntityInfo::from_entity(entity)),
                content: Some(entity.content.clone()),
                error: String::new(),
            },
            Err(e) => GetEntityResult {
                ok: false,
                entity: None,
                content: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn list_entities(&self, limit: usize) -> EntityListResult {
        let total = self.store.len();
        let entities: Vec<EntityInfo> = self
            .store
            .entities()
            .take(limit)
            .map(EntityInfo::from_entity)
            .collect();
        EntityListResult {
            count: entities.len(),
            total,
            entities,
        }
    }

    #[must_use]
    pub fn instances_of(&self, schema_id: &str) -> InstancesOfResult {
        match self.store.instances_of(schema_id) {
            Ok(instances) => InstancesOfResult {
                schema_id: schema_id.to_owned(),
                count: instances.len(),
                instances: instances.iter().map(|e| EntityInfo::from_entity(e)).collect(),
                error: String::new(),
            },
            Err(e) => InstancesOfResult {
                schema_id: schema_id.to_owned(),
                count: 0,
                instances: Vec::new(),
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn compatibility(&self, old_schema_id: &str, new_schema_id: &str) -> CompatibilityResult {
        match self.store.is_minor_compatible(old_schema_id, new_schema_id) {
            Ok(verdict) => CompatibilityResult {
                old: old_schema_id.to_owned(),
                new: new_schema_id.to_owned(),
                ok: true,
                verdict: Some(verdict),
                error: String::new(),
            },
            Err(e) => CompatibilityResult {
                old: old_schema_id.to_owned(),
                new: new_schema_id.to_owned(),
                ok: false,
                verdict: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn cast(&self, from_id: &str, to_schema_id: &str) -> CastResult {
        match self.store.cast(from_id, to_schema_id) {
            Ok(outcome) => CastResult {
                from: from_id.to_owned(),
                to: outcome.to_id.clone(),
                ok: true,
                outcome: Some(outcome),
                error: String::new(),
            },
            Err(e) => CastResult {
                from: from_id.to_owned(),
                to: to_schema_id.to_owned(),
                ok: false,
                outcome: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn schema_graph(&self, gts_id: &str) -> GraphResult {
        match self.store.build_schema_graph(gts_id) {
            Ok(graph) => GraphResult {
                ok: true,
                graph: Some(graph),
                error: String::new(),
            },
            Err(e) => GraphResult {
                ok: false,
                graph: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn query(&self, expr: &str, limit: usize) -> QueryResponse {
        match self.store.query(expr) {
            Ok(mut result) => {
                result.results.truncate(limit);
                QueryResponse {
                    count: result.count,
                    limit,
                    results: result.results,
                    error: String::new(),
                }
            }
            Err(e) => QueryResponse {
                count: 0,
                limit,
                results: Vec::new(),
                error: e.to_string(),
            },
        }
    }

    /// Resolves `gts.…~@path` against the store.
    #[must_use]
    pub fn attr(&self, gts_with_path: &str) -> AttrResult {
        let (id, path) = match GtsId::split_at_path(gts_with_path) {
            Ok(parts) => parts,
            Err(e) => {
                return AttrResult {
                    id: gts_with_path.to_owned(),
                    path: String::new(),
                    resolved: false,
                    value: None,
                    error: e.to_string(),
                };
            }
        };
        let Some(path) = path else {
            return AttrResult {
                id,
                path: String::new(),
                resolved: false,
                value: None,
                error: "attribute selector requires an '@path' after the identifier".to_owned(),
            };
        };
        let entity = match self.store.entity(&id) {
            Ok(entity) => entity,
            Err(e) => {
                return AttrResult {
                    id,
                    path,
                    resolved: false,
                    value: None,
                    error: e.to_string(),
                };
            }
        };
        match entity.resolve_path(&path) {
            Ok(value) => AttrResult {
                id,
                path,
                resolved: true,
                value: Some(value),
                error: String::new(),
            },
            Err(e) => AttrResult {
                id,
                path,
                resolved: false,
                value: None,
                error: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> &LoadReport {
        self.store.report()
    }
}
