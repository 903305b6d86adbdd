use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::cast::{self, CastError, CastOutcome};
use crate::compat::{self, CompatVerdict};
use crate::entity::{EntityKind, GtsConfig, GtsEntity};
use crate::id::{GtsId, IdError};
use crate::query::{GtsQuery, QueryError, QueryHit, QueryResult};
use crate::reader::GtsReader;
use crate::validator::{DraftValidator, SchemaValidator, Violation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entity with GTS ID '{0}' in the store")]
    NoSuchEntity(String),
    #[error("no schema with GTS ID '{0}' in the store")]
    NoSuchSchema(String),
    #[error("no instance with GTS ID '{0}' in the store")]
    NoSuchInstance(String),
    #[error("'{0}' does not name an instance")]
    NotAnInstance(String),
    #[error("schemas '{a}' and '{b}' are not comparable: {reason}")]
    Incomparable { a: String, b: String, reason: String },
    #[error("instance '{id}' violates schema '{schema_id}'")]
    SchemaViolation {
        id: String,
        schema_id: String,
        violations: Vec<Violation>,
    },
    #[error(transparent)]
    MalformedId(#[from] IdError),
    #[error(transparent)]
    MalformedQuery(#[from] QueryError),
    #[error(transparent)]
    Cast(#[from] CastError),
}

/// A later document claiming an id that is already taken. The first entity
/// wins; the loser is reported here.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateId {
    pub id: String,
    pub source: String,
    pub kept_source: String,
}

/// A document the loader could not turn into an entity.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

/// A GTS reference whose target is not in the store.
#[derive(Debug, Clone, Serialize)]
pub struct BrokenRef {
    pub schema_id: String,
    pub target: String,
    pub path: String,
}

/// Load-time diagnostics. Duplicates and broken references are collected
/// here rather than aborting the load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub duplicates: Vec<DuplicateId>,
    pub skipped: Vec<SkippedDocument>,
    pub broken_refs: Vec<BrokenRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub path: String,
    pub target: String,
    pub broken: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub refs: Vec<GraphEdge>,
}

/// The reference subgraph reachable from one schema, in BFS order. Broken
/// edges are annotated in place; cycles are enumerated separately.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaGraph {
    pub root: String,
    pub nodes: Vec<GraphNode>,
    pub cycles: Vec<Vec<String>>,
}

/// An immutable, load-once collection of GTS entities with derived indexes.
/// All read operations take `&self`; a loaded store can be shared across
/// threads as long as the validator is reentrant.
pub struct GtsStore {
    cfg: GtsConfig,
    entities: BTreeMap<String, GtsEntity>,
    instances_by_schema: BTreeMap<String, Vec<String>>,
    report: LoadReport,
    validator: Box<dyn SchemaValidator>,
}

impl GtsStore {
    /// Loads a store from a reader using the default JSON Schema validator.
    pub fn load(reader: &mut dyn GtsReader, cfg: GtsConfig) -> Self {
        Self::load_with_validator(reader, cfg, Box::new(DraftValidator))
    }

    /// Loads a store from a reader, draining it exactly once. Duplicate ids
    /// keep the first entity and report the rest; documents without a usable
    /// id are reported as skipped.
    pub fn load_with_validator(
        reader: &mut dyn GtsReader,
        cfg: GtsConfig,
        validator: Box<dyn SchemaValidator>,
    ) -> Self {
        let mut entities: BTreeMap<String, GtsEntity> = BTreeMap::new();
        let mut report = LoadReport::default();

        for (source, document) in reader.documents() {
            match GtsEntity::from_document(&source, document, &cfg) {
                Some(entity) => {
                    let id = entity.id.to_string();
                    if let Some(existing) = entities.get(&id) {
                        tracing::debug!(%id, %source, "duplicate id, first entity wins");
                        report.duplicates.push(DuplicateId {
                            id,
                            source,
                            kept_source: existing.source.clone(),
                        });
                    } else {
                        entities.insert(id, entity);
                    }
                }
                None => {
                    tracing::debug!(%source, "no usable GTS identifier, skipping");
                    report.skipped.push(SkippedDocument {
                        source,
                        reason: "no usable GTS identifier".to_owned(),
                    });
                }
            }
        }
        report.loaded = entities.len();

        let mut instances_by_schema: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entity in entities.values() {
            if let EntityKind::Instance { schema_id } = &entity.kind {
                instances_by_schema
                    .entry(schema_id.to_string())
                    .or_default()
                    .push(entity.id.to_string());
            }
        }

        for entity in entities.values().filter(|e| e.is_schema()) {
            for reference in &entity.refs {
                if !entities.contains_key(&reference.target) {
                    report.broken_refs.push(BrokenRef {
                        schema_id: entity.id.to_string(),
                        target: reference.target.clone(),
                        path: reference.path.clone(),
                    });
                }
            }
        }

        tracing::info!(
            entities = entities.len(),
            duplicates = report.duplicates.len(),
            broken_refs = report.broken_refs.len(),
            "gts store loaded"
        );
        GtsStore {
            cfg,
            entities,
            instances_by_schema,
            report,
            validator,
        }
    }

    /// Convenience for in-memory documents.
    #[must_use]
    pub fn from_documents(documents: Vec<(String, Value)>, cfg: GtsConfig) -> Self {
        let mut reader = documents;
        Self::load(&mut reader, cfg)
    }

    #[must_use]
    pub fn config(&self) -> &GtsConfig {
        &self.cfg
    }

    #[must_use]
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in canonical id order.
    pub fn entities(&self) -> impl Iterator<Item = &GtsEntity> {
        self.entities.values()
    }

    /// Looks up an entity by id. Accepts any parseable spelling of the id
    /// (`gts://` prefix, surrounding whitespace).
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GtsEntity> {
        let gid = GtsId::parse(id).ok()?;
        self.entities.get(gid.as_str())
    }

    /// Like [`GtsStore::get`], but a lookup miss is an error.
    ///
    /// # Errors
    /// `MalformedId` when `id` does not parse, `NoSuchEntity` on a miss.
    pub fn entity(&self, id: &str) -> Result<&GtsEntity, StoreError> {
        let gid = GtsId::parse(id)?;
        self.entities
            .get(gid.as_str())
            .ok_or_else(|| StoreError::NoSuchEntity(gid.to_string()))
    }

    /// Instances declaring exactly the given schema id, in canonical order.
    ///
    /// # Errors
    /// Returns `StoreError::MalformedId` when `schema_id` does not parse.
    pub fn instances_of(&self, schema_id: &str) -> Result<Vec<&GtsEntity>, StoreError> {
        let gid = GtsId::parse(schema_id)?;
        Ok(self
            .instances_by_schema
            .get(gid.as_str())
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default())
    }

    fn schema_entity(&self, id: &str) -> Result<(GtsId, &GtsEntity), StoreError> {
        let gid = GtsId::parse(id)?;
        let entity = self
            .entities
            .get(gid.as_str())
            .filter(|e| e.is_schema())
            .ok_or_else(|| StoreError::NoSuchSchema(gid.to_string()))?;
        Ok((gid, entity))
    }

    /// Validates an instance against its declared schema via the pluggable
    /// validator.
    ///
    /// # Errors
    /// `NoSuchInstance` / `NoSuchSchema` on lookup misses,
    /// `SchemaViolation` with the validator's diagnostics on failure.
    pub fn validate_instance(&self, id: &str) -> Result<(), StoreError> {
        let gid = GtsId::parse(id)?;
        let entity = self
            .entities
            .get(gid.as_str())
            .ok_or_else(|| StoreError::NoSuchInstance(gid.to_string()))?;
        let EntityKind::Instance { schema_id } = &entity.kind else {
            return Err(StoreError::NotAnInstance(gid.to_string()));
        };
        let schema = self
            .entities
            .get(schema_id.as_str())
            .ok_or_else(|| StoreError::NoSuchSchema(schema_id.to_string()))?;
        tracing::debug!(instance = %gid, schema = %schema_id, "validating instance");
        self.validator
            .validate(&entity.content, &schema.content)
            .map_err(|violations| StoreError::SchemaViolation {
                id: gid.to_string(),
                schema_id: schema_id.to_string(),
                violations,
            })
    }

    /// Minor-version compatibility verdict for two schemas sharing identity
    /// and MAJOR.
    ///
    /// # Errors
    /// `NoSuchSchema` on lookup misses; `Incomparable` when identity or
    /// MAJOR differ.
    pub fn is_minor_compatible(&self, a: &str, b: &str) -> Result<CompatVerdict, StoreError> {
        let (ga, ea) = self.schema_entity(a)?;
        let (gb, eb) = self.schema_entity(b)?;
        if !ga.same_identity(&gb) {
            return Err(StoreError::Incomparable {
                a: ga.to_string(),
                b: gb.to_string(),
                reason: "different type identities".to_owned(),
            });
        }
        if ga.version().major != gb.version().major {
            return Err(StoreError::Incomparable {
                a: ga.to_string(),
                b: gb.to_string(),
                reason: "different MAJOR versions".to_owned(),
            });
        }
        Ok(compat::minor_compat(&ea.content, &eb.content))
    }

    /// Casts an instance onto a target schema.
    ///
    /// # Errors
    /// Lookup misses surface as `NoSuchInstance` / `NoSuchSchema`; cast
    /// preconditions surface as `CastError` variants.
    pub fn cast(&self, from_id: &str, target_schema_id: &str) -> Result<CastOutcome, StoreError> {
        let gid = GtsId::parse(from_id)?;
        let entity = self
            .entities
            .get(gid.as_str())
            .ok_or_else(|| StoreError::NoSuchInstance(gid.to_string()))?;
        let EntityKind::Instance { schema_id } = &entity.kind else {
            return Err(StoreError::NotAnInstance(gid.to_string()));
        };
        let source_schema = self
            .entities
            .get(schema_id.as_str())
            .ok_or_else(|| StoreError::NoSuchSchema(schema_id.to_string()))?;
        let (target_id, target_schema) = self.schema_entity(target_schema_id)?;
        tracing::debug!(instance = %gid, target = %target_id, "casting instance");
        Ok(cast::cast_entity(
            &gid,
            &entity.content,
            schema_id,
            &source_schema.content,
            &target_id,
            &target_schema.content,
            &self.cfg.instance_id_key,
        )?)
    }

    /// Builds the reference subgraph reachable from `root`, BFS order.
    /// Reference cycles are safe and enumerated in the result.
    ///
    /// # Errors
    /// Returns `NoSuchSchema` when `root` does not name a schema in the store.
    pub fn build_schema_graph(&self, root: &str) -> Result<SchemaGraph, StoreError> {
        let (gid, _) = self.schema_entity(root)?;
        let root_id = gid.to_string();

        let mut nodes = Vec::new();
        let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root_id.clone()]);
        seen.insert(root_id.clone());

        while let Some(id) = queue.pop_front() {
            let refs: Vec<GraphEdge> = self
                .entities
                .get(&id)
                .map(|entity| {
                    entity
                        .refs
                        .iter()
                        .map(|r| GraphEdge {
                            path: r.path.clone(),
                            target: r.target.clone(),
                            broken: !self.entities.contains_key(&r.target),
                        })
                        .collect()
                })
                .unwrap_or_default();
            for edge in refs.iter().filter(|e| !e.broken) {
                adjacency
                    .entry(id.clone())
                    .or_default()
                    .push(edge.target.clone());
                if seen.insert(edge.target.clone()) {
                    queue.push_back(edge.target.clone());
                }
            }
            nodes.push(GraphNode { id, refs });
        }

        let cycles = find_cycles(&root_id, &adjacency);
        Ok(SchemaGraph {
            root: root_id,
            nodes,
            cycles,
        })
    }

    /// Runs a query over the whole store. Results are sorted by canonical id.
    ///
    /// # Errors
    /// Returns `MalformedQuery` when the expression does not parse.
    pub fn query(&self, expr: &str) -> Result<QueryResult, StoreError> {
        let query = GtsQuery::parse(expr)?;
        let results: Vec<QueryHit> = self
            .entities
            .values()
            .filter(|entity| query.matches(entity))
            .map(|entity| QueryHit {
                id: entity.id.to_string(),
                content: entity.content.clone(),
            })
            .collect();
        Ok(QueryResult {
            count: results.len(),
            results,
        })
    }
}

/// Enumerates reference cycles reachable from `root` with an iterative DFS.
/// Each cycle is rotated so its smallest id comes first, then deduplicated.
fn find_cycles(root: &str, adjacency: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut on_path: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, usize)> = vec![(root.to_owned(), 0)];

    while let Some((node, child_idx)) = stack.pop() {
        if child_idx == 0 {
            path.push(node.clone());
            on_path.insert(node.clone());
            visited.insert(node.clone());
        }
        let children = adjacency.get(&node).map(Vec::as_slice).unwrap_or_default();
        if child_idx < children.len() {
            let child = &children[child_idx];
            stack.push((node.clone(), child_idx + 1));
            if on_path.contains(child) {
                if let Some(start) = path.iter().position(|n| n == child) {
                    let cycle = canonical_rotation(&path[start..]);
                    if seen_cycles.insert(cycle.clone()) {
                        cycles.push(cycle);
                    }
                }
            } else if !visited.contains(child) {
                stack.push((child.clone(), 0));
            }
        } else {
            path.pop();
            on_path.remove(&node);
        }
    }
    cycles
}

fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(min_idx) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(idx, _)| idx)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_idx..]);
    rotated.extend_from_slice(&cycle[..min_idx]);
    rotated
}
