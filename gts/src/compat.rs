//! Minor-version compatibility between two JSON Schema bodies.
//!
//! The engine computes a directional acceptance check: `accepts(S, T)` holds
//! when every instance valid under `S` can be accepted by `T` after default
//! filling, which is exactly the precondition the cast engine needs. Backward
//! compatibility of `A -> B` is `accepts(A, B)`; forward is `accepts(B, A)`.
//!
//! Only `type`, `required`, `properties`, `items`, `enum`, `const`, `oneOf`,
//! `anyOf` and `additionalProperties` are inspected; unknown keywords are
//! ignored.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

/// Verdict for an ordered pair of schemas with equal identity and MAJOR.
#[derive(Debug, Clone, Serialize)]
pub struct CompatVerdict {
    pub backward: bool,
    pub forward: bool,
    pub full: bool,
    pub backward_errors: Vec<String>,
    pub forward_errors: Vec<String>,
}

/// Computes the (backward, forward, full) triple for `old -> new`.
#[must_use]
pub fn minor_compat(old: &Value, new: &Value) -> CompatVerdict {
    let backward_errors = direction_errors(old, new);
    let forward_errors = direction_errors(new, old);
    let backward = backward_errors.is_empty();
    let forward = forward_errors.is_empty();
    CompatVerdict {
        backward,
        forward,
        full: backward && forward,
        backward_errors,
        forward_errors,
    }
}

/// Everything preventing `target` from accepting instances of `source`.
/// Empty means the direction holds.
#[must_use]
pub fn direction_errors(source: &Value, target: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    // Object schema pairs still to compare, keyed by instance path.
    let mut work: Vec<(String, Value, Value)> = Vec::new();
    check_value_pair("", source, target, &mut errors, &mut work);
    while let Some((path, src, tgt)) = work.pop() {
        check_object_pair(&path, &src, &tgt, &mut errors, &mut work);
    }
    errors
}

fn properties(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn required(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn has_default(prop: &Value) -> bool {
    prop.as_object().is_some_and(|m| m.contains_key("default"))
}

fn joined(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_owned()
    } else {
        format!("{path}.{name}")
    }
}

fn at(path: &str) -> String {
    if path.is_empty() {
        "the document root".to_owned()
    } else {
        format!("'{path}'")
    }
}

fn field(path: &str) -> String {
    if path.is_empty() {
        "the document root".to_owned()
    } else {
        format!("field '{path}'")
    }
}

fn check_object_pair(
    path: &str,
    src: &Value,
    tgt: &Value,
    errors: &mut Vec<String>,
    work: &mut Vec<(String, Value, Value)>,
) {
    let src_props = properties(src);
    let tgt_props = properties(tgt);
    let src_required = required(src);
    let tgt_required = required(tgt);

    for name in &src_required {
        if !tgt_required.contains(name) {
            errors.push(format!(
                "field '{}' is required by the source schema but not by the target",
                joined(path, name)
            ));
        }
    }
    for name in tgt_required.difference(&src_required) {
        let defaulted = tgt_props.get(name).is_some_and(has_default);
        if !defaulted {
            errors.push(format!(
                "field '{}' is newly required by the target schema and has no default",
                joined(path, name)
            ));
        }
    }

    for (name, src_prop) in &src_props {
        let field = joined(path, name);
        match tgt_props.get(name) {
            Some(tgt_prop) => check_value_pair(&field, src_prop, tgt_prop, errors, work),
            None => {
                if !has_default(src_prop) {
                    errors.push(format!(
                        "field '{field}' is absent from the target schema and has no default to justify dropping it"
                    ));
                }
            }
        }
    }

    let tgt_closed = tgt.get("additionalProperties") == Some(&Value::Bool(false));
    let src_closed = src.get("additionalProperties") == Some(&Value::Bool(false));
    if tgt_closed && !src_closed {
        errors.push(format!(
            "target schema at {} forbids additional properties while the source allows them",
            at(path)
        ));
    }
}

/// `oneOf`/`anyOf` variants, or the schema itself as a single variant.
fn variants(schema: &Value) -> Vec<Value> {
    if let Some(obj) = schema.as_object() {
        for key in ["oneOf", "anyOf"] {
            if let Some(Value::Array(items)) = obj.get(key) {
                return items.clone();
            }
        }
    }
    vec![schema.clone()]
}

/// Values a schema pins via `const` or `enum`, or `None` when unconstrained.
fn enumerated(schema: &Value) -> Option<Vec<Value>> {
    let obj = schema.as_object()?;
    if let Some(c) = obj.get("const") {
        return Some(vec![c.clone()]);
    }
    if let Some(Value::Array(items)) = obj.get("enum") {
        return Some(items.clone());
    }
    None
}

fn check_value_pair(
    path: &str,
    src: &Value,
    tgt: &Value,
    errors: &mut Vec<String>,
    work: &mut Vec<(String, Value, Value)>,
) {
    let src_variants = variants(src);
    let tgt_variants = variants(tgt);
    if src_variants.len() == 1 && tgt_variants.len() == 1 {
        check_branch_pair(path, &src_variants[0], &tgt_variants[0], errors, work);
        return;
    }
    for variant in &src_variants {
        let accepted = tgt_variants
            .iter()
            .any(|candidate| variant_errors(path, variant, candidate).is_empty());
        if !accepted {
            errors.push(format!(
                "{}: no target variant accepts the source variant {variant}",
                field(path)
            ));
        }
    }
}

/// Self-contained check of a single variant pair, used for branch selection.
fn variant_errors(path: &str, src: &Value, tgt: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let mut work = Vec::new();
    check_branch_pair(path, src, tgt, &mut errors, &mut work);
    while let Some((p, s, t)) = work.pop() {
        check_object_pair(&p, &s, &t, &mut errors, &mut work);
    }
    errors
}

fn check_branch_pair(
    path: &str,
    src: &Value,
    tgt: &Value,
    errors: &mut Vec<String>,
    work: &mut Vec<(String, Value, Value)>,
) {
    match (enumerated(src), enumerated(tgt)) {
        (Some(src_values), Some(tgt_values)) => {
            for value in &src_values {
                if !tgt_values.contains(value) {
                    errors.push(format!(
                        "{}: value {value} allowed by the source is not allowed by the target",
                        field(path)
                    ));
                }
            }
        }
        (None, Some(_)) => {
            errors.push(format!(
                "{}: target restricts values to an enum the source does not declare",
                field(path)
            ));
        }
        _ => {}
    }

    let src_type = src.get("type").and_then(Value::as_str);
    let tgt_type = tgt.get("type").and_then(Value::as_str);
    if let (Some(s), Some(t)) = (src_type, tgt_type)
        && s != t
    {
        errors.push(format!("{}: type changed from {s} to {t}", field(path)));
        return;
    }

    let objectish = |schema: &Value, schema_type: Option<&str>| {
        schema_type == Some("object")
            || schema.get("properties").is_some()
            || schema.get("required").is_some()
    };
    if objectish(src, src_type) || objectish(tgt, tgt_type) {
        work.push((path.to_owned(), src.clone(), tgt.clone()));
    }

    if src_type == Some("array") || tgt_type == Some("array") {
        check_items_pair(path, src, tgt, errors, work);
    }
}

fn check_items_pair(
    path: &str,
    src: &Value,
    tgt: &Value,
    errors: &mut Vec<String>,
    work: &mut Vec<(String, Value, Value)>,
) {
    match (src.get("items"), tgt.get("items")) {
        (Some(Value::Array(src_tuple)), Some(Value::Array(tgt_tuple))) => {
            if src_tuple.len() != tgt_tuple.len() {
                errors.push(format!(
                    "{}: tuple length changed from {} to {}",
                    field(path),
                    src_tuple.len(),
                    tgt_tuple.len()
                ));
                return;
            }
            for (idx, (s, t)) in src_tuple.iter().zip(tgt_tuple).enumerate() {
                check_value_pair(&format!("{path}[{idx}]"), s, t, errors, work);
            }
        }
        (Some(Value::Array(_)), Some(_)) | (Some(_), Some(Value::Array(_))) => {
            errors.push(format!(
                "{}: tuple-style items and uniform items are not interchangeable",
                field(path)
            ));
        }
        (Some(s), Some(t)) => {
            check_value_pair(&format!("{path}[]"), s, t, errors, work);
        }
        (None, Some(_)) => {
            errors.push(format!(
                "{}: target constrains array items the source leaves unconstrained",
                field(path)
            ));
        }
        _ => {}
    }
}
