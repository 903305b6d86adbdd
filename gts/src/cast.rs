use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::compat;
use crate::id::GtsId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CastError {
    #[error("'{0}' does not name an instance")]
    NotAnInstance(String),
    #[error("cannot cast between different type identities '{from}' and '{to}'")]
    IdentityMismatch { from: String, to: String },
    #[error("cannot cast across major versions (v{from} -> v{to})")]
    MajorMismatch { from: u32, to: u32 },
    #[error("instance cannot be cast: {}", offending_fields.join("; "))]
    NotCastable { offending_fields: Vec<String> },
    #[error("only object instances can be cast")]
    InstanceMustBeObject,
}

/// A transformed instance plus the diagnostics describing what changed.
#[derive(Debug, Clone, Serialize)]
pub struct CastOutcome {
    pub from_id: String,
    pub to_id: String,
    pub entity: Value,
    /// Fields filled from target-schema defaults, as dotted paths.
    pub defaulted: Vec<String>,
    /// Fields dropped because the target schema does not model them.
    pub dropped: Vec<String>,
}

/// Casts an instance document from its declared schema onto a target minor
/// version. The instance's id is re-stamped onto the target schema id, with
/// the instance suffix preserved.
///
/// # Errors
/// Returns `CastError` when the schemas differ in identity or MAJOR, when the
/// source schema is not backward compatible with the target, or when a
/// required field cannot be defaulted.
#[allow(clippy::too_many_arguments)]
pub fn cast_entity(
    instance_id: &GtsId,
    instance: &Value,
    source_schema_id: &GtsId,
    source_schema: &Value,
    target_schema_id: &GtsId,
    target_schema: &Value,
    instance_id_key: &str,
) -> Result<CastOutcome, CastError> {
    let suffix = instance_id
        .instance()
        .ok_or_else(|| CastError::NotAnInstance(instance_id.to_string()))?;

    // Idempotent by construction when nothing changes.
    if source_schema_id == target_schema_id {
        return Ok(CastOutcome {
            from_id: instance_id.to_string(),
            to_id: instance_id.to_string(),
            entity: instance.clone(),
            defaulted: Vec::new(),
            dropped: Vec::new(),
        });
    }

    if !source_schema_id.same_identity(target_schema_id) {
        return Err(CastError::IdentityMismatch {
            from: source_schema_id.to_string(),
            to: target_schema_id.to_string(),
        });
    }
    if source_schema_id.version().major != target_schema_id.version().major {
        return Err(CastError::MajorMismatch {
            from: source_schema_id.version().major,
            to: target_schema_id.version().major,
        });
    }

    let errors = compat::direction_errors(source_schema, target_schema);
    if !errors.is_empty() {
        return Err(CastError::NotCastable {
            offending_fields: errors,
        });
    }

    let object = instance
        .as_object()
        .ok_or(CastError::InstanceMustBeObject)?;

    let mut defaulted = Vec::new();
    let mut dropped = Vec::new();
    let mut missing = Vec::new();
    let mut result = cast_object(
        object,
        target_schema,
        "",
        Some(instance_id_key),
        &mut defaulted,
        &mut dropped,
        &mut missing,
    );
    if !missing.is_empty() {
        return Err(CastError::NotCastable {
            offending_fields: missing,
        });
    }

    let to_id = format!("{target_schema_id}{suffix}");
    result.insert(instance_id_key.to_owned(), Value::String(to_id.clone()));

    defaulted.sort();
    defaulted.dedup();
    dropped.sort();
    dropped.dedup();

    Ok(CastOutcome {
        from_id: instance_id.to_string(),
        to_id,
        entity: Value::Object(result),
        defaulted,
        dropped,
    })
}

fn joined(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_owned()
    } else {
        format!("{path}.{name}")
    }
}

/// Applies the casting rules to one object level: fill defaults, drop fields
/// the target does not model, recurse through object properties and arrays of
/// objects. Required fields that stay absent are collected into `missing`.
fn cast_object(
    object: &Map<String, Value>,
    schema: &Value,
    base_path: &str,
    keep_key: Option<&str>,
    defaulted: &mut Vec<String>,
    dropped: &mut Vec<String>,
    missing: &mut Vec<String>,
) -> Map<String, Value> {
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default();

    let mut result = object.clone();

    for (name, prop) in &props {
        if !result.contains_key(name)
            && let Some(default) = prop.get("default")
        {
            result.insert(name.clone(), default.clone());
            defaulted.push(joined(base_path, name));
        }
    }

    for name in &required {
        if !result.contains_key(name) {
            missing.push(format!(
                "required field '{}' is missing and the target schema has no default for it",
                joined(base_path, name)
            ));
        }
    }

    // Fields the target schema does not model are dropped. An unconstrained
    // target (no `properties` at all) keeps the document as-is.
    if schema.get("properties").is_some() {
        let keys: Vec<String> = result.keys().cloned().collect();
        for key in keys {
            if !props.contains_key(&key) && keep_key != Some(key.as_str()) {
                result.remove(&key);
                dropped.push(joined(base_path, &key));
            }
        }
    }

    for (name, prop) in &props {
        let Some(value) = result.get_mut(name) else {
            continue;
        };
        match prop.get("type").and_then(Value::as_str) {
            Some("object") => {
                if let Value::Object(inner) = value {
                    let sub = cast_object(
                        &inner.clone(),
                        prop,
                        &joined(base_path, name),
                        None,
                        defaulted,
                        dropped,
                        missing,
                    );
                    *value = Value::Object(sub);
                }
            }
            Some("array") => {
                if let Value::Array(items) = value
                    && let Some(item_schema) = prop.get("items")
                    && item_schema.get("type").and_then(Value::as_str) == Some("object")
                {
                    for (idx, item) in items.iter_mut().enumerate() {
                        if let Value::Object(inner) = item {
                            let sub = cast_object(
                                &inner.clone(),
                                item_schema,
                                &format!("{}[{idx}]", joined(base_path, name)),
                                None,
                                defaulted,
                                dropped,
                                missing,
                            );
                            *item = Value::Object(sub);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> GtsId {
        GtsId::parse(s).expect("id")
    }

    fn event_schemas() -> (Value, Value) {
        let v10 = json!({
            "$id": "gts.x.core.events.event.v1.0~",
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}}
        });
        let v11 = json!({
            "$id": "gts.x.core.events.event.v1.1~",
            "type": "object",
            "required": ["a"],
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "integer", "default": 0}
            }
        });
        (v10, v11)
    }

    #[test]
    fn test_cast_fills_default_and_restamps_id() {
        let (v10, v11) = event_schemas();
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.0~i.v1",
            "a": "hello"
        });
        let outcome = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            &id("gts.x.core.events.event.v1.1~"),
            &v11,
            "gtsId",
        )
        .expect("cast");
        assert_eq!(outcome.to_id, "gts.x.core.events.event.v1.1~i.v1");
        assert_eq!(
            outcome.entity,
            json!({
                "gtsId": "gts.x.core.events.event.v1.1~i.v1",
                "a": "hello",
                "b": 0
            })
        );
        assert_eq!(outcome.defaulted, vec!["b".to_owned()]);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_cast_to_same_schema_is_identity() {
        let (v10, _) = event_schemas();
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.0~i.v1",
            "a": "hello",
            "extra": true
        });
        let outcome = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            "gtsId",
        )
        .expect("cast");
        assert_eq!(outcome.entity, instance);
        assert!(outcome.defaulted.is_empty());
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_cast_drops_fields_absent_from_target() {
        let (v10, v11) = event_schemas();
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.1~i.v1",
            "a": "hello",
            "b": 3
        });
        // downcast v1.1 -> v1.0: 'b' has a default, so it is droppable
        let outcome = cast_entity(
            &id("gts.x.core.events.event.v1.1~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.1~"),
            &v11,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            "gtsId",
        )
        .expect("cast");
        assert_eq!(
            outcome.entity,
            json!({
                "gtsId": "gts.x.core.events.event.v1.0~i.v1",
                "a": "hello"
            })
        );
        assert_eq!(outcome.dropped, vec!["b".to_owned()]);
    }

    #[test]
    fn test_cast_fails_when_not_backward_compatible() {
        let (v10, mut v11) = event_schemas();
        // strip the default: v1.0 -> v1.1 stays backward compatible, but
        // v1.1 -> v1.0 now drops 'b' without a default
        v11["properties"]["b"]
            .as_object_mut()
            .expect("object")
            .remove("default");
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.1~i.v1",
            "a": "hello",
            "b": 3
        });
        let err = cast_entity(
            &id("gts.x.core.events.event.v1.1~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.1~"),
            &v11,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            "gtsId",
        )
        .expect_err("not castable");
        assert!(matches!(err, CastError::NotCastable { .. }));
    }

    #[test]
    fn test_cast_across_major_versions_fails() {
        let (v10, mut v2) = event_schemas();
        v2["$id"] = json!("gts.x.core.events.event.v2~");
        let instance = json!({"gtsId": "gts.x.core.events.event.v1.0~i.v1", "a": "x"});
        let err = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            &id("gts.x.core.events.event.v2~"),
            &v2,
            "gtsId",
        )
        .expect_err("major mismatch");
        assert_eq!(err, CastError::MajorMismatch { from: 1, to: 2 });
    }

    #[test]
    fn test_cast_across_identities_fails() {
        let (v10, _) = event_schemas();
        let other = json!({"type": "object", "properties": {}});
        let instance = json!({"gtsId": "gts.x.core.events.event.v1.0~i.v1", "a": "x"});
        let err = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            &id("gts.x.core.events.other.v1.1~"),
            &other,
            "gtsId",
        )
        .expect_err("identity mismatch");
        assert!(matches!(err, CastError::IdentityMismatch { .. }));
    }

    #[test]
    fn test_cast_recurses_into_nested_objects() {
        let source = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}}
                }
            }
        });
        let target = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "role": {"type": "string", "default": "guest"}
                    }
                }
            }
        });
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.0~i.v1",
            "user": {"name": "alice"}
        });
        let outcome = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &source,
            &id("gts.x.core.events.event.v1.1~"),
            &target,
            "gtsId",
        )
        .expect("cast");
        assert_eq!(outcome.entity["user"]["role"], json!("guest"));
        assert_eq!(outcome.defaulted, vec!["user.role".to_owned()]);
    }

    #[test]
    fn test_cast_recurses_into_arrays_of_objects() {
        let source = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"sku": {"type": "string"}}
                    }
                }
            }
        });
        let target = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "sku": {"type": "string"},
                            "qty": {"type": "integer", "default": 1}
                        }
                    }
                }
            }
        });
        let instance = json!({
            "gtsId": "gts.x.core.events.event.v1.0~i.v1",
            "items": [{"sku": "a"}, {"sku": "b", "qty": 5}]
        });
        let outcome = cast_entity(
            &id("gts.x.core.events.event.v1.0~i.v1"),
            &instance,
            &id("gts.x.core.events.event.v1.0~"),
            &source,
            &id("gts.x.core.events.event.v1.1~"),
            &target,
            "gtsId",
        )
        .expect("cast");
        assert_eq!(outcome.entity["items"][0]["qty"], json!(1));
        assert_eq!(outcome.entity["items"][1]["qty"], json!(5));
        assert_eq!(outcome.defaulted, vec!["items[0].qty".to_owned()]);
    }

    #[test]
    fn test_cast_requires_instance_id() {
        let (v10, v11) = event_schemas();
        let err = cast_entity(
            &id("gts.x.core.events.event.v1.0~"),
            &json!({"a": "x"}),
            &id("gts.x.core.events.event.v1.0~"),
            &v10,
            &id("gts.x.core.events.event.v1.1~"),
            &v11,
            "gtsId",
        )
        .expect_err("schema id");
        assert!(matches!(err, CastError::NotAnInstance(_)));
    }
}
