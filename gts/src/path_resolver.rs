use serde_json::{Value, json};
use thiserror::Error;

use crate::entity::GtsEntity;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("no value at '{at}' in path '{path}'")]
    NoSuchPath { path: String, at: String },
    #[error("cannot descend into a non-container at '{at}' in path '{path}'")]
    TypeMismatch { path: String, at: String },
    #[error("attribute path is empty")]
    EmptyPath,
}

/// Splits a path into tokens. `/` is accepted as an alternative separator and
/// `a[0].b` is normalized to the same tokens as `a.0.b`.
fn tokenize(path: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for part in path.replace('/', ".").split('.') {
        if part.is_empty() {
            continue;
        }
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            if !rest[..open].is_empty() {
                tokens.push(rest[..open].to_owned());
            }
            match rest[open..].find(']') {
                Some(close) => {
                    tokens.push(rest[open + 1..open + close].to_owned());
                    rest = &rest[open + close + 1..];
                }
                None => {
                    tokens.push(rest[open..].to_owned());
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            tokens.push(rest.to_owned());
        }
    }
    tokens
}

fn descend(root: &Value, tokens: &[String], full_path: &str) -> Result<Value, PathError> {
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(token).ok_or_else(|| PathError::NoSuchPath {
                path: full_path.to_owned(),
                at: token.clone(),
            })?,
            Value::Array(items) => {
                let idx: usize = token.parse().map_err(|_| PathError::TypeMismatch {
                    path: full_path.to_owned(),
                    at: token.clone(),
                })?;
                items.get(idx).ok_or_else(|| PathError::NoSuchPath {
                    path: full_path.to_owned(),
                    at: token.clone(),
                })?
            }
            _ => {
                return Err(PathError::TypeMismatch {
                    path: full_path.to_owned(),
                    at: token.clone(),
                });
            }
        };
    }
    Ok(current.clone())
}

/// Resolves a dotted path against a bare document.
///
/// # Errors
/// Returns `PathError` when the path is empty or does not resolve.
pub fn resolve_document_path(content: &Value, path: &str) -> Result<Value, PathError> {
    let tokens = tokenize(path);
    if tokens.is_empty() {
        return Err(PathError::EmptyPath);
    }
    descend(content, &tokens, path)
}

/// Resolves a path against an entity. A leading `@` selects identifier
/// metadata instead of document fields; the metadata value re-enters normal
/// navigation, so `@namespace.0` works.
///
/// # Errors
/// Returns `PathError` when the path is empty or does not resolve.
pub fn resolve_entity_path(entity: &GtsEntity, path: &str) -> Result<Value, PathError> {
    let Some(meta_path) = path.strip_prefix('@') else {
        return resolve_document_path(&entity.content, path);
    };
    let tokens = tokenize(meta_path);
    let Some((head, rest)) = tokens.split_first() else {
        return Err(PathError::EmptyPath);
    };
    let value = metadata_value(entity, head).ok_or_else(|| PathError::NoSuchPath {
        path: path.to_owned(),
        at: format!("@{head}"),
    })?;
    if rest.is_empty() {
        Ok(value)
    } else {
        descend(&value, rest, path)
    }
}

fn metadata_value(entity: &GtsEntity, key: &str) -> Option<Value> {
    let id = &entity.id;
    let value = match key {
        "id" => json!(id.as_str()),
        "schema" => json!(entity.schema_id().as_str()),
        "vendor" => json!(id.vendor()),
        "package" => json!(id.package()),
        "namespace" => json!(id.namespaces()),
        "type" => json!(id.type_name()),
        "major" => json!(id.version().major),
        "minor" => id.version().minor.map_or(Value::Null, |m| json!(m)),
        "patch" => id.version().patch.map_or(Value::Null, |p| json!(p)),
        "instance" => id.instance().map_or(Value::Null, |i| json!(i.to_string())),
        "uuid" => json!(id.to_uuid().to_string()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{GtsConfig, GtsEntity};
    use serde_json::json;

    fn entity(doc: Value) -> GtsEntity {
        GtsEntity::from_document("test.json", doc, &GtsConfig::default()).expect("entity")
    }

    #[test]
    fn test_resolve_simple_path() {
        let value = resolve_document_path(&json!({"field": "value"}), "field").expect("resolved");
        assert_eq!(value, json!("value"));
    }

    #[test]
    fn test_resolve_nested_path() {
        let doc = json!({"outer": {"inner": "value"}});
        assert_eq!(
            resolve_document_path(&doc, "outer.inner").expect("resolved"),
            json!("value")
        );
    }

    #[test]
    fn test_resolve_array_by_dotted_index() {
        let doc = json!({"items": [1, 2, 3]});
        assert_eq!(
            resolve_document_path(&doc, "items.1").expect("resolved"),
            json!(2)
        );
    }

    #[test]
    fn test_resolve_array_by_bracket_index() {
        let doc = json!({"items": [1, 2, 3]});
        assert_eq!(
            resolve_document_path(&doc, "items[1]").expect("resolved"),
            json!(2)
        );
    }

    #[test]
    fn test_missing_field_is_no_such_path() {
        let err = resolve_document_path(&json!({"field": 1}), "missing").expect_err("miss");
        assert!(matches!(err, PathError::NoSuchPath { .. }));
    }

    #[test]
    fn test_index_out_of_range_is_no_such_path() {
        let err = resolve_document_path(&json!({"items": [1]}), "items.5").expect_err("miss");
        assert!(matches!(err, PathError::NoSuchPath { .. }));
    }

    #[test]
    fn test_descend_into_scalar_is_type_mismatch() {
        let err = resolve_document_path(&json!({"a": 1}), "a.b").expect_err("mismatch");
        assert!(matches!(err, PathError::TypeMismatch { .. }));
    }

    #[test]
    fn test_non_numeric_array_key_is_type_mismatch() {
        let err = resolve_document_path(&json!({"a": [1]}), "a.b").expect_err("mismatch");
        assert!(matches!(err, PathError::TypeMismatch { .. }));
    }

    #[test]
    fn test_empty_path() {
        assert_eq!(
            resolve_document_path(&json!({}), ""),
            Err(PathError::EmptyPath)
        );
    }

    #[test]
    fn test_metadata_paths() {
        let e = entity(json!({"gtsId": "gts.x.core.events.event.v1.2~evt.v1.main"}));
        assert_eq!(
            e.resolve_path("@id").expect("id"),
            json!("gts.x.core.events.event.v1.2~evt.v1.main")
        );
        assert_eq!(
            e.resolve_path("@schema").expect("schema"),
            json!("gts.x.core.events.event.v1.2~")
        );
        assert_eq!(e.resolve_path("@vendor").expect("vendor"), json!("x"));
        assert_eq!(e.resolve_path("@package").expect("package"), json!("core"));
        assert_eq!(e.resolve_path("@namespace").expect("ns"), json!(["events"]));
        assert_eq!(e.resolve_path("@namespace.0").expect("ns0"), json!("events"));
        assert_eq!(e.resolve_path("@type").expect("type"), json!("event"));
        assert_eq!(e.resolve_path("@major").expect("major"), json!(1));
        assert_eq!(e.resolve_path("@minor").expect("minor"), json!(2));
        assert_eq!(e.resolve_path("@patch").expect("patch"), json!(null));
        assert_eq!(
            e.resolve_path("@instance").expect("instance"),
            json!("evt.v1.main")
        );
    }

    #[test]
    fn test_metadata_uuid_is_stable() {
        let e = entity(json!({"$id": "gts.x.core.events.event.v1~"}));
        assert_eq!(
            e.resolve_path("@uuid").expect("uuid"),
            json!("a580f904-e0a6-5c23-8ad8-d977d7fe8390")
        );
    }

    #[test]
    fn test_unknown_metadata_key() {
        let e = entity(json!({"$id": "gts.x.core.events.event.v1~"}));
        let err = e.resolve_path("@nope").expect_err("unknown");
        assert!(matches!(err, PathError::NoSuchPath { .. }));
    }

    #[test]
    fn test_payload_path_on_entity() {
        let e = entity(json!({
            "gtsId": "gts.x.core.events.event.v1~evt.v1",
            "user": {"id": 7}
        }));
        assert_eq!(e.resolve_path("user.id").expect("value"), json!(7));
    }
}
