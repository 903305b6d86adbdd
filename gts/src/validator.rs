use serde::Serialize;
use serde_json::Value;

/// A single JSON Schema violation, surfaced verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

/// Seam for the JSON Schema engine. The store never interprets violations
/// beyond surfacing them, so drafts and vocabularies can change without
/// touching identifier, graph, compatibility, cast or query logic.
/// Implementations must be reentrant: a loaded store may be shared read-only
/// across threads.
pub trait SchemaValidator: Send + Sync {
    /// Validates `document` against `schema`.
    ///
    /// # Errors
    /// Returns the list of violations when the document does not conform.
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), Vec<Violation>>;
}

/// Default validator backed by the `jsonschema` crate (Draft 2020-12).
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftValidator;

impl SchemaValidator for DraftValidator {
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), Vec<Violation>> {
        // `$id`/`$schema` are GTS ids here, not resolvable URIs; strip them
        // before compilation.
        let mut schema = schema.clone();
        if let Value::Object(map) = &mut schema {
            map.remove("$id");
            map.remove("$schema");
        }
        let compiled = jsonschema::validator_for(&schema).map_err(|e| {
            vec![Violation {
                path: String::new(),
                message: format!("schema compilation failed: {e}"),
            }]
        })?;
        let violations: Vec<Violation> = compiled
            .iter_errors(document)
            .map(|err| Violation {
                path: err.instance_path.to_string(),
                message: err.to_string(),
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
