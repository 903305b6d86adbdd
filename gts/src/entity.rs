use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::id::{GTS_UUID_NAMESPACE, GtsId};
use crate::path_resolver::{self, PathError};

/// Conventions-over-configuration knobs. Loadable from `gts.config.json`;
/// every field falls back to the GTS defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GtsConfig {
    /// JSON property a schema's id is read from.
    pub schema_id_key: String,
    /// JSON property an instance's id is read from.
    pub instance_id_key: String,
    /// JSON property whose value is always treated as a GTS reference.
    pub reference_key: String,
    /// When true, only `reference_key` values count as references; otherwise
    /// any string value that parses as a GTS id does.
    pub strict_references: bool,
    /// v5 namespace for derived UUIDs.
    pub uuid_namespace: Uuid,
}

impl Default for GtsConfig {
    fn default() -> Self {
        GtsConfig {
            schema_id_key: "$id".to_owned(),
            instance_id_key: "gtsId".to_owned(),
            reference_key: "x-gts-ref".to_owned(),
            strict_references: false,
            uuid_namespace: GTS_UUID_NAMESPACE,
        }
    }
}

/// A GTS reference found inside a schema body, with the JSON path it sits at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GtsRef {
    pub target: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Schema,
    Instance { schema_id: GtsId },
}

/// A document paired with the GTS id extracted from it.
#[derive(Debug, Clone)]
pub struct GtsEntity {
    pub id: GtsId,
    pub kind: EntityKind,
    pub source: String,
    pub content: Value,
    /// GTS references extracted from the body; populated for schemas only.
    pub refs: Vec<GtsRef>,
}

impl GtsEntity {
    /// Builds an entity from a decoded document, or `None` when no usable id
    /// can be derived. The instance id key is consulted before the schema id
    /// key; the first value that parses as a GTS id wins, and the presence of
    /// an instance suffix decides the kind.
    #[must_use]
    pub fn from_document(source: &str, content: Value, cfg: &GtsConfig) -> Option<GtsEntity> {
        let id = Self::extract_id(&content, cfg)?;
        let kind = if id.is_schema() {
            EntityKind::Schema
        } else {
            EntityKind::Instance {
                schema_id: id.schema_id(),
            }
        };
        let mut entity = GtsEntity {
            id,
            kind,
            source: source.to_owned(),
            content,
            refs: Vec::new(),
        };
        if entity.is_schema() {
            entity.refs = entity.collect_refs(cfg);
        }
        Some(entity)
    }

    /// Id extraction without the entity wrapper, for probing arbitrary
    /// documents.
    #[must_use]
    pub fn extract_id(content: &Value, cfg: &GtsConfig) -> Option<GtsId> {
        let obj = content.as_object()?;
        for key in [&cfg.instance_id_key, &cfg.schema_id_key] {
            if let Some(raw) = obj.get(key).and_then(Value::as_str)
                && let Ok(id) = GtsId::parse(raw)
            {
                return Some(id);
            }
        }
        None
    }

    #[must_use]
    pub fn is_schema(&self) -> bool {
        matches!(self.kind, EntityKind::Schema)
    }

    /// The schema governing this entity: itself for schemas, the declared
    /// schema for instances.
    #[must_use]
    pub fn schema_id(&self) -> &GtsId {
        match &self.kind {
            EntityKind::Schema => &self.id,
            EntityKind::Instance { schema_id } => schema_id,
        }
    }

    /// Resolves a dotted attribute path (`a.b.0.c`) or an `@`-metadata path
    /// against this entity.
    ///
    /// # Errors
    /// Returns `PathError` when the path does not resolve.
    pub fn resolve_path(&self, path: &str) -> Result<Value, PathError> {
        path_resolver::resolve_entity_path(self, path)
    }

    fn collect_refs(&self, cfg: &GtsConfig) -> Vec<GtsRef> {
        let mut found = Vec::new();
        Self::walk_refs(&self.content, "", cfg, &mut found);
        let own = self.id.as_str();
        let mut seen = HashSet::new();
        found.retain(|r| r.target != own && seen.insert((r.target.clone(), r.path.clone())));
        found
    }

    fn walk_refs(node: &Value, path: &str, cfg: &GtsConfig, out: &mut Vec<GtsRef>) {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    if cfg.strict_references
                        && key == &cfg.reference_key
                        && let Some(target) = value.as_str().and_then(canonical_id)
                    {
                        out.push(GtsRef {
                            target,
                            path: child.clone(),
                        });
                    }
                    Self::walk_refs(value, &child, cfg, out);
                }
            }
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    Self::walk_refs(item, &format!("{path}[{idx}]"), cfg, out);
                }
            }
            Value::String(raw) => {
                if !cfg.strict_references
                    && let Some(target) = canonical_id(raw)
                {
                    out.push(GtsRef {
                        target,
                        path: if path.is_empty() {
                            "root".to_owned()
                        } else {
                            path.to_owned()
                        },
                    });
                }
            }
            _ => {}
        }
    }
}

fn canonical_id(raw: &str) -> Option<String> {
    GtsId::parse(raw).ok().map(|id| id.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> GtsConfig {
        GtsConfig::default()
    }

    #[test]
    fn test_schema_from_document() {
        let doc = json!({"$id": "gts.x.core.events.event.v1~", "type": "object"});
        let entity = GtsEntity::from_document("a.json", doc, &cfg()).expect("entity");
        assert!(entity.is_schema());
        assert_eq!(entity.id.as_str(), "gts.x.core.events.event.v1~");
        assert_eq!(entity.schema_id().as_str(), "gts.x.core.events.event.v1~");
    }

    #[test]
    fn test_instance_from_document() {
        let doc = json!({"gtsId": "gts.x.core.events.event.v1~evt.v1", "status": "active"});
        let entity = GtsEntity::from_document("b.json", doc, &cfg()).expect("entity");
        assert!(!entity.is_schema());
        assert_eq!(entity.schema_id().as_str(), "gts.x.core.events.event.v1~");
    }

    #[test]
    fn test_instance_id_key_wins_over_schema_id_key() {
        let doc = json!({
            "gtsId": "gts.x.core.events.event.v1~evt.v1",
            "$id": "gts.x.core.events.other.v1~"
        });
        let entity = GtsEntity::from_document("c.json", doc, &cfg()).expect("entity");
        assert_eq!(entity.id.as_str(), "gts.x.core.events.event.v1~evt.v1");
    }

    #[test]
    fn test_document_without_id_is_skipped() {
        assert!(GtsEntity::from_document("d.json", json!({"name": "n"}), &cfg()).is_none());
        assert!(GtsEntity::from_document("e.json", json!({"$id": "not-a-gts-id"}), &cfg()).is_none());
        assert!(GtsEntity::from_document("f.json", json!(42), &cfg()).is_none());
    }

    #[test]
    fn test_kind_follows_suffix_not_key() {
        // A schema id under the instance key still makes a schema entity.
        let doc = json!({"gtsId": "gts.x.core.events.event.v1~"});
        let entity = GtsEntity::from_document("g.json", doc, &cfg()).expect("entity");
        assert!(entity.is_schema());
    }

    #[test]
    fn test_loose_reference_extraction() {
        let doc = json!({
            "$id": "gts.x.core.events.event.v1~",
            "properties": {
                "kind": {"const": "gts.x.core.events.kind.v1~"}
            },
            "x-gts-ref": "gts.x.core.events.base.v1~"
        });
        let entity = GtsEntity::from_document("h.json", doc, &cfg()).expect("entity");
        let targets: Vec<_> = entity.refs.iter().map(|r| r.target.as_str()).collect();
        assert!(targets.contains(&"gts.x.core.events.kind.v1~"));
        assert!(targets.contains(&"gts.x.core.events.base.v1~"));
        // the schema's own id is not a reference
        assert!(!targets.contains(&"gts.x.core.events.event.v1~"));
    }

    #[test]
    fn test_strict_reference_extraction() {
        let mut strict = cfg();
        strict.strict_references = true;
        let doc = json!({
            "$id": "gts.x.core.events.event.v1~",
            "properties": {
                "kind": {"const": "gts.x.core.events.kind.v1~"}
            },
            "x-gts-ref": "gts.x.core.events.base.v1~"
        });
        let entity = GtsEntity::from_document("i.json", doc, &strict).expect("entity");
        assert_eq!(entity.refs.len(), 1);
        assert_eq!(entity.refs[0].target, "gts.x.core.events.base.v1~");
        assert_eq!(entity.refs[0].path, "x-gts-ref");
    }

    #[test]
    fn test_reference_paths_and_dedup() {
        let doc = json!({
            "$id": "gts.x.core.events.event.v1~",
            "a": ["gts.x.core.events.kind.v1~", "gts.x.core.events.kind.v1~"],
            "b": {"c": "gts.x.core.events.kind.v1~"}
        });
        let entity = GtsEntity::from_document("j.json", doc, &cfg()).expect("entity");
        let paths: Vec<_> = entity.refs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a[0]", "a[1]", "b.c"]);
    }

    #[test]
    fn test_instances_have_no_refs() {
        let doc = json!({
            "gtsId": "gts.x.core.events.event.v1~evt.v1",
            "other": "gts.x.core.events.kind.v1~"
        });
        let entity = GtsEntity::from_document("k.json", doc, &cfg()).expect("entity");
        assert!(entity.refs.is_empty());
    }

    #[test]
    fn test_config_from_json_with_defaults() {
        let cfg: GtsConfig =
            serde_json::from_str(r#"{"strict_references": true}"#).expect("config");
        assert!(cfg.strict_references);
        assert_eq!(cfg.schema_id_key, "$id");
        assert_eq!(cfg.instance_id_key, "gtsId");
        assert_eq!(cfg.reference_key, "x-gts-ref");
        assert_eq!(
            cfg.uuid_namespace.to_string(),
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
        );
    }
}
