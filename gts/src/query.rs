use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::entity::GtsEntity;
use crate::id::GtsWildcard;
use crate::path_resolver;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("malformed query '{expr}': {reason}")]
    Malformed { expr: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring containment, strings only.
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub path: String,
    pub op: CmpOp,
    pub value: Value,
}

/// A parsed query: `<pattern>[<path> <op> <literal>(, ...)]`.
#[derive(Debug, Clone)]
pub struct GtsQuery {
    pub pattern: GtsWildcard,
    pub predicates: Vec<Predicate>,
}

impl GtsQuery {
    /// Parses a query expression.
    ///
    /// # Errors
    /// Returns `QueryError::Malformed` on unbalanced brackets, a bad wildcard,
    /// or an unparsable predicate.
    pub fn parse(expr: &str) -> Result<GtsQuery, QueryError> {
        let fail = |reason: String| QueryError::Malformed {
            expr: expr.to_owned(),
            reason,
        };
        let trimmed = expr.trim();
        let (base, predicates) = match trimmed.find('[') {
            None => {
                if trimmed.contains(']') {
                    return Err(fail("unbalanced ']'".to_owned()));
                }
                (trimmed, Vec::new())
            }
            Some(open) => {
                let base = trimmed[..open].trim_end();
                let rest = &trimmed[open + 1..];
                let inner = rest
                    .strip_suffix(']')
                    .ok_or_else(|| fail("predicates must end with ']'".to_owned()))?;
                if inner.contains('[') || inner.contains(']') {
                    return Err(fail("nested brackets are not supported".to_owned()));
                }
                (base, parse_predicates(inner).map_err(&fail)?)
            }
        };
        let pattern = GtsWildcard::parse(base).map_err(|e| fail(e.to_string()))?;
        Ok(GtsQuery {
            pattern,
            predicates,
        })
    }

    /// True when the entity's id matches the pattern and every predicate
    /// holds. A predicate whose path does not resolve excludes the entity.
    #[must_use]
    pub fn matches(&self, entity: &GtsEntity) -> bool {
        entity.id.matches(&self.pattern) && self.predicates.iter().all(|p| eval(entity, p))
    }
}

/// Splits the predicate list on commas, treating commas inside double-quoted
/// literals as content.
fn split_terms(input: &str) -> Result<Vec<String>, String> {
    let mut terms = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            ',' if !in_quotes => {
                terms.push(buf.trim().to_owned());
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }
    if in_quotes {
        return Err("unterminated string literal".to_owned());
    }
    terms.push(buf.trim().to_owned());
    Ok(terms)
}

fn parse_predicates(input: &str) -> Result<Vec<Predicate>, String> {
    if input.trim().is_empty() {
        return Err("empty predicate list".to_owned());
    }
    split_terms(input)?
        .into_iter()
        .map(|term| parse_predicate(&term))
        .collect()
}

fn parse_predicate(term: &str) -> Result<Predicate, String> {
    if term.is_empty() {
        return Err("empty predicate".to_owned());
    }
    let mut iter = term.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        let next = iter.peek().map(|(_, c)| *c);
        let (op, len) = match ch {
            '!' if next == Some('=') => (CmpOp::Ne, 2),
            '<' if next == Some('=') => (CmpOp::Le, 2),
            '>' if next == Some('=') => (CmpOp::Ge, 2),
            '<' => (CmpOp::Lt, 1),
            '>' => (CmpOp::Gt, 1),
            '=' => (CmpOp::Eq, 1),
            '~' => (CmpOp::Contains, 1),
            _ => continue,
        };
        let path = term[..idx].trim();
        if path.is_empty() {
            return Err(format!("predicate '{term}' has no path"));
        }
        let literal = term[idx + len..].trim();
        let value = parse_literal(literal)?;
        return Ok(Predicate {
            path: path.to_owned(),
            op,
            value,
        });
    }
    Err(format!("predicate '{term}' has no comparison operator"))
}

fn parse_literal(raw: &str) -> Result<Value, String> {
    if raw.is_empty() {
        return Err("missing literal".to_owned());
    }
    for quote in ['"', '\''] {
        if raw.starts_with(quote) {
            let inner = raw
                .strip_prefix(quote)
                .and_then(|r| r.strip_suffix(quote))
                .ok_or_else(|| format!("unterminated string literal {raw}"))?;
            return Ok(Value::String(inner.to_owned()));
        }
    }
    match raw {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "null" => Ok(Value::Null),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(f) = raw.parse::<f64>()
                && let Some(n) = Number::from_f64(f)
            {
                return Ok(Value::Number(n));
            }
            Ok(Value::String(raw.to_owned()))
        }
    }
}

fn eval(entity: &GtsEntity, predicate: &Predicate) -> bool {
    let Ok(actual) = path_resolver::resolve_entity_path(entity, &predicate.path) else {
        return false;
    };
    compare(&actual, predicate.op, &predicate.value)
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn compare(actual: &Value, op: CmpOp, literal: &Value) -> bool {
    match op {
        CmpOp::Eq => loose_eq(actual, literal),
        CmpOp::Ne => !loose_eq(actual, literal),
        CmpOp::Contains => match (actual.as_str(), literal.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = if let (Some(x), Some(y)) = (actual.as_f64(), literal.as_f64()) {
                x.partial_cmp(&y)
            } else if let (Some(x), Some(y)) = (actual.as_str(), literal.as_str()) {
                Some(x.cmp(y))
            } else {
                None
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                _ => false,
            }
        }
    }
}

/// One query match: the canonical id plus the matching document.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub content: Value,
}

/// Matches sorted by canonical id.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub count: usize,
    pub results: Vec<QueryHit>,
}
