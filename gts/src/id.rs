use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

pub const GTS_PREFIX: &str = "gts.";
pub const GTS_URI_PREFIX: &str = "gts://";

/// Default v5 namespace for GTS UUIDs (RFC 4122 DNS namespace).
pub const GTS_UUID_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

const MAX_ID_LEN: usize = 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("malformed GTS identifier '{id}': {reason}")]
    MalformedId { id: String, reason: String },
    #[error("malformed GTS wildcard '{pattern}': {reason}")]
    MalformedWildcard { pattern: String, reason: String },
}

/// `vMAJOR[.MINOR[.PATCH]]`. A missing MINOR is not the same version as
/// MINOR `0`; equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GtsVersion {
    pub major: u32,
    pub minor: Option<u32>,
    pub patch: Option<u32>,
}

impl GtsVersion {
    /// True when `other` is this version or a MINOR/PATCH refinement of it.
    /// Components missing from `self` are unbounded.
    #[must_use]
    pub fn covers(&self, other: &GtsVersion) -> bool {
        if self.major != other.major {
            return false;
        }
        if let Some(minor) = self.minor {
            if other.minor != Some(minor) {
                return false;
            }
            if let Some(patch) = self.patch
                && other.patch != Some(patch)
            {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for GtsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;
        }
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        Ok(())
    }
}

/// The part after `~` in an instance id: `<type>.v<MAJOR>[...][.<identity>...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub type_name: String,
    pub version: GtsVersion,
    pub identity: Vec<String>,
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.version)?;
        for segment in &self.identity {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// A parsed GTS identifier:
///
/// ```text
/// gts.<vendor>.<package>.<namespace>*.<type>.v<MAJOR>[.<MINOR>[.<PATCH>]]~[<instance>]
/// ```
///
/// Ids without an instance suffix name schemas; ids with one name instances.
/// The canonical string round-trips: `GtsId::parse(s)?.as_str() == s` for any
/// already-canonical `s`.
#[derive(Debug, Clone)]
pub struct GtsId {
    id: String,
    vendor: String,
    package: String,
    namespaces: Vec<String>,
    type_name: String,
    version: GtsVersion,
    instance: Option<InstanceRef>,
}

fn is_segment(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'))
}

/// Numeric version component: digits only, no leading zeros.
fn parse_number(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

fn parse_major(token: &str) -> Option<u32> {
    token.strip_prefix('v').and_then(parse_number)
}

/// Splits `tokens` into name segments and a version, consuming trailing
/// numeric tokens as MINOR/PATCH.
fn parse_name_tokens(tokens: &[&str]) -> Result<(Vec<String>, GtsVersion), String> {
    let mut end = tokens.len();
    let mut trail: Vec<u32> = Vec::new();
    while end > 0 && trail.len() < 2 {
        match parse_number(tokens[end - 1]) {
            Some(n) => {
                trail.push(n);
                end -= 1;
            }
            None => break,
        }
    }
    if end == 0 {
        return Err("missing version token".to_owned());
    }
    let major = parse_major(tokens[end - 1])
        .ok_or_else(|| format!("invalid version token '{}'", tokens[end - 1]))?;
    end -= 1;
    trail.reverse();
    let version = GtsVersion {
        major,
        minor: trail.first().copied(),
        patch: trail.get(1).copied(),
    };
    if end < 3 {
        return Err("too few segments (vendor, package and type are required)".to_owned());
    }
    for token in &tokens[..end] {
        if !is_segment(token) {
            return Err(format!("invalid segment '{token}'"));
        }
    }
    Ok((
        tokens[..end].iter().map(|s| (*s).to_owned()).collect(),
        version,
    ))
}

fn parse_suffix(suffix: &str) -> Result<InstanceRef, String> {
    let tokens: Vec<&str> = suffix.split('.').collect();
    if tokens.len() < 2 {
        return Err("instance suffix needs a type and a version".to_owned());
    }
    if !is_segment(tokens[0]) {
        return Err(format!("invalid instance type '{}'", tokens[0]));
    }
    let major = parse_major(tokens[1])
        .ok_or_else(|| format!("invalid instance version token '{}'", tokens[1]))?;
    // Numeric tokens straight after the version refine it; the rest is identity.
    let mut idx = 2;
    let mut minor = None;
    let mut patch = None;
    if idx < tokens.len()
        && let Some(n) = parse_number(tokens[idx])
    {
        minor = Some(n);
        idx += 1;
        if idx < tokens.len()
            && let Some(n) = parse_number(tokens[idx])
        {
            patch = Some(n);
            idx += 1;
        }
    }
    let mut identity = Vec::new();
    for token in &tokens[idx..] {
        if !is_segment(token) {
            return Err(format!("invalid identity segment '{token}'"));
        }
        identity.push((*token).to_owned());
    }
    Ok(InstanceRef {
        type_name: tokens[0].to_owned(),
        version: GtsVersion { major, minor, patch },
        identity,
    })
}

impl GtsId {
    /// Parses and validates an identifier. Accepts surrounding whitespace and
    /// an optional `gts://` URI prefix, both absent from the canonical form.
    ///
    /// # Errors
    /// Returns `IdError::MalformedId` on any grammar violation.
    pub fn parse(input: &str) -> Result<GtsId, IdError> {
        let fail = |reason: String| IdError::MalformedId {
            id: input.to_owned(),
            reason,
        };
        let raw = input.trim();
        let raw = raw.strip_prefix(GTS_URI_PREFIX).unwrap_or(raw);
        if raw.len() > MAX_ID_LEN {
            return Err(fail("too long".to_owned()));
        }
        if raw.chars().any(char::is_uppercase) {
            return Err(fail("must be lower case".to_owned()));
        }
        let body = raw
            .strip_prefix(GTS_PREFIX)
            .ok_or_else(|| fail(format!("does not start with '{GTS_PREFIX}'")))?;
        let tilde = body
            .find('~')
            .ok_or_else(|| fail("missing '~' separator".to_owned()))?;
        let (name_part, rest) = body.split_at(tilde);
        let suffix_part = &rest[1..];
        if suffix_part.contains('~') {
            return Err(fail("more than one '~' separator".to_owned()));
        }

        let tokens: Vec<&str> = name_part.split('.').collect();
        let (mut segments, version) = parse_name_tokens(&tokens).map_err(&fail)?;
        let instance = if suffix_part.is_empty() {
            None
        } else {
            Some(parse_suffix(suffix_part).map_err(&fail)?)
        };

        let type_name = segments.pop().unwrap_or_default();
        let vendor = segments.remove(0);
        let package = segments.remove(0);
        Ok(GtsId {
            id: raw.to_owned(),
            vendor,
            package,
            namespaces: segments,
            type_name,
            version,
            instance,
        })
    }

    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// The canonical identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    #[must_use]
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn version(&self) -> &GtsVersion {
        &self.version
    }

    #[must_use]
    pub fn instance(&self) -> Option<&InstanceRef> {
        self.instance.as_ref()
    }

    #[must_use]
    pub fn is_schema(&self) -> bool {
        self.instance.is_none()
    }

    #[must_use]
    pub fn is_instance(&self) -> bool {
        self.instance.is_some()
    }

    /// Vendor, package, namespaces and type in order, without the version.
    #[must_use]
    pub fn name_segments(&self) -> Vec<&str> {
        let mut segments = Vec::with_capacity(3 + self.namespaces.len());
        segments.push(self.vendor.as_str());
        segments.push(self.package.as_str());
        segments.extend(self.namespaces.iter().map(String::as_str));
        segments.push(self.type_name.as_str());
        segments
    }

    /// The raw dotted tokens of the instance suffix, empty for schema ids.
    #[must_use]
    pub fn suffix_tokens(&self) -> Vec<String> {
        let Some(instance) = &self.instance else {
            return Vec::new();
        };
        let mut tokens = vec![
            instance.type_name.clone(),
            format!("v{}", instance.version.major),
        ];
        if let Some(minor) = instance.version.minor {
            tokens.push(minor.to_string());
        }
        if let Some(patch) = instance.version.patch {
            tokens.push(patch.to_string());
        }
        tokens.extend(instance.identity.iter().cloned());
        tokens
    }

    /// True when both ids share vendor, package, namespaces and type.
    #[must_use]
    pub fn same_identity(&self, other: &GtsId) -> bool {
        self.vendor == other.vendor
            && self.package == other.package
            && self.namespaces == other.namespaces
            && self.type_name == other.type_name
    }

    /// The schema id this id belongs to: the id itself for schemas, the id
    /// truncated after `~` for instances.
    #[must_use]
    pub fn schema_id(&self) -> GtsId {
        if self.instance.is_none() {
            return self.clone();
        }
        let head = self
            .id
            .split_inclusive('~')
            .next()
            .unwrap_or(self.id.as_str())
            .to_owned();
        GtsId {
            id: head,
            vendor: self.vendor.clone(),
            package: self.package.clone(),
            namespaces: self.namespaces.clone(),
            type_name: self.type_name.clone(),
            version: self.version,
            instance: None,
        }
    }

    /// Deterministic UUID v5 of the canonical id under the default namespace.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.uuid_in(&GTS_UUID_NAMESPACE)
    }

    #[must_use]
    pub fn uuid_in(&self, namespace: &Uuid) -> Uuid {
        Uuid::new_v5(namespace, self.id.as_bytes())
    }

    #[must_use]
    pub fn matches(&self, pattern: &GtsWildcard) -> bool {
        pattern.matches(self)
    }

    /// Splits `gts.…~@a.b.c` into the identifier and the attribute path.
    ///
    /// # Errors
    /// Returns `IdError::MalformedId` when the path after `@` is empty.
    pub fn split_at_path(input: &str) -> Result<(String, Option<String>), IdError> {
        match input.split_once('@') {
            None => Ok((input.to_owned(), None)),
            Some((_, "")) => Err(IdError::MalformedId {
                id: input.to_owned(),
                reason: "attribute path after '@' is empty".to_owned(),
            }),
            Some((id, path)) => Ok((id.to_owned(), Some(path.to_owned()))),
        }
    }
}

impl fmt::Display for GtsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl PartialEq for GtsId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GtsId {}

impl std::hash::Hash for GtsId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for GtsId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GtsId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::str::FromStr for GtsId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for GtsId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<'de> Deserialize<'de> for GtsId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Star,
    Lit(String),
}

impl Tok {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Tok::Star => true,
            Tok::Lit(lit) => lit == segment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NamePattern {
    /// A bare `*` before `~`: any vendor/package/namespaces/type and version.
    Any,
    Segments(Vec<Tok>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionPattern {
    Any,
    Exact(GtsVersion),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SuffixPattern {
    /// No suffix: matches schema ids only.
    Schema,
    /// Trailing `~*`: any version refinement, any suffix or none.
    Subtree,
    /// Concrete suffix tokens; `open` when a trailing `*` swallows the rest.
    Instance { tokens: Vec<Tok>, open: bool },
}

/// A GTS id pattern: any segment (and the version token) may be `*`, a `*`
/// may trail the `~`, and a bare `*` may stand for the whole schema part.
/// `*` matches exactly one segment, never a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtsWildcard {
    pattern: String,
    name: NamePattern,
    version: VersionPattern,
    suffix: SuffixPattern,
}

fn parse_pattern_name(tokens: &[&str]) -> Result<(Vec<Tok>, VersionPattern), String> {
    if tokens.is_empty() {
        return Err("missing segments".to_owned());
    }
    let (name_end, version) = if tokens[tokens.len() - 1] == "*" {
        (tokens.len() - 1, VersionPattern::Any)
    } else {
        let mut end = tokens.len();
        let mut trail: Vec<u32> = Vec::new();
        while end > 0 && trail.len() < 2 {
            match parse_number(tokens[end - 1]) {
                Some(n) => {
                    trail.push(n);
                    end -= 1;
                }
                None => break,
            }
        }
        if end == 0 {
            return Err("missing version token".to_owned());
        }
        let major = parse_major(tokens[end - 1])
            .ok_or_else(|| format!("invalid version token '{}'", tokens[end - 1]))?;
        trail.reverse();
        (
            end - 1,
            VersionPattern::Exact(GtsVersion {
                major,
                minor: trail.first().copied(),
                patch: trail.get(1).copied(),
            }),
        )
    };
    if name_end < 3 {
        return Err("too few segments (vendor, package and type are required)".to_owned());
    }
    let mut name = Vec::with_capacity(name_end);
    for token in &tokens[..name_end] {
        if *token == "*" {
            name.push(Tok::Star);
        } else if is_segment(token) {
            name.push(Tok::Lit((*token).to_owned()));
        } else {
            return Err(format!("invalid segment '{token}'"));
        }
    }
    Ok((name, version))
}

fn parse_pattern_suffix(suffix: &str) -> Result<SuffixPattern, String> {
    if suffix.is_empty() {
        return Ok(SuffixPattern::Schema);
    }
    if suffix == "*" {
        return Ok(SuffixPattern::Subtree);
    }
    let raw: Vec<&str> = suffix.split('.').collect();
    let open = raw.len() > 1 && raw[raw.len() - 1] == "*";
    let end = if open { raw.len() - 1 } else { raw.len() };
    let mut tokens = Vec::with_capacity(end);
    for token in &raw[..end] {
        if *token == "*" {
            tokens.push(Tok::Star);
        } else if is_segment(token) {
            tokens.push(Tok::Lit((*token).to_owned()));
        } else {
            return Err(format!("invalid suffix token '{token}'"));
        }
    }
    Ok(SuffixPattern::Instance { tokens, open })
}

impl GtsWildcard {
    /// Parses a wildcard pattern.
    ///
    /// # Errors
    /// Returns `IdError::MalformedWildcard` when the pattern violates the
    /// pattern grammar.
    pub fn parse(input: &str) -> Result<GtsWildcard, IdError> {
        let fail = |reason: String| IdError::MalformedWildcard {
            pattern: input.to_owned(),
            reason,
        };
        let raw = input.trim();
        let raw = raw.strip_prefix(GTS_URI_PREFIX).unwrap_or(raw);
        if raw.chars().any(char::is_uppercase) {
            return Err(fail("must be lower case".to_owned()));
        }
        let tilde = raw
            .find('~')
            .ok_or_else(|| fail("missing '~' separator".to_owned()))?;
        let (left, rest) = raw.split_at(tilde);
        let suffix_part = &rest[1..];
        if suffix_part.contains('~') {
            return Err(fail("more than one '~' separator".to_owned()));
        }

        let (name, version) = if left == "*" {
            (NamePattern::Any, VersionPattern::Any)
        } else {
            let body = left
                .strip_prefix(GTS_PREFIX)
                .ok_or_else(|| fail(format!("does not start with '{GTS_PREFIX}'")))?;
            let tokens: Vec<&str> = body.split('.').collect();
            let (segments, version) = parse_pattern_name(&tokens).map_err(&fail)?;
            (NamePattern::Segments(segments), version)
        };
        let suffix = parse_pattern_suffix(suffix_part).map_err(&fail)?;
        Ok(GtsWildcard {
            pattern: raw.to_owned(),
            name,
            version,
            suffix,
        })
    }

    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, id: &GtsId) -> bool {
        if let NamePattern::Segments(tokens) = &self.name {
            let segments = id.name_segments();
            if tokens.len() != segments.len() {
                return false;
            }
            if tokens
                .iter()
                .zip(&segments)
                .any(|(token, segment)| !token.matches(segment))
            {
                return false;
            }
        }
        if let VersionPattern::Exact(version) = self.version {
            let matched = if self.suffix == SuffixPattern::Subtree {
                version.covers(id.version())
            } else {
                version == *id.version()
            };
            if !matched {
                return false;
            }
        }
        match &self.suffix {
            SuffixPattern::Schema => id.is_schema(),
            SuffixPattern::Subtree => true,
            SuffixPattern::Instance { tokens, open } => {
                if id.is_schema() {
                    return false;
                }
                let suffix = id.suffix_tokens();
                if *open {
                    if suffix.len() < tokens.len() {
                        return false;
                    }
                } else if suffix.len() != tokens.len() {
                    return false;
                }
                tokens
                    .iter()
                    .zip(&suffix)
                    .all(|(token, segment)| token.matches(segment))
            }
        }
    }
}

impl fmt::Display for GtsWildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
