//! Declarative field-level merging.
//!
//! A [`FieldSpec`] lists, per canonical field, the source fields to consult
//! in precedence order and what to use when none of them has a value. Rules
//! address leaves by dotted target path, so nested objects are assembled one
//! sub-field at a time: a source that has `vacationTotal` but no
//! `vacationUsed` contributes only the total.

use serde_json::{Map, Number, Value};

use crate::canonical::CanonicalDocument;
use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRef {
    Primary,
    /// Index into the resolved secondaries handed to [`merge`].
    Secondary(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: SourceRef,
    /// Dotted field path on the source; empty means the whole record.
    pub path: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    Value(Value),
    /// Leave the field out of the document.
    Omit,
    /// `minuend - subtrahend`, both target paths filled by earlier rules.
    Difference {
        minuend: &'static str,
        subtrahend: &'static str,
    },
    /// Earlier target paths joined with a space, blanks skipped.
    Join(Vec<&'static str>),
    /// `<primary id>@<domain>`, for records that never had a contact address.
    SyntheticEmail { domain: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub target: &'static str,
    pub candidates: Vec<Candidate>,
    pub default: FieldDefault,
}

impl FieldRule {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            candidates: Vec::new(),
            default: FieldDefault::Omit,
        }
    }

    pub fn from(mut self, source: SourceRef, path: &'static str) -> Self {
        self.candidates.push(Candidate { source, path });
        self
    }

    pub fn or(mut self, default: Value) -> Self {
        self.default = FieldDefault::Value(default);
        self
    }

    pub fn or_default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: &'static str,
    rules: Vec<FieldRule>,
    server_timestamps: Vec<&'static str>,
}

impl FieldSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
            server_timestamps: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules<I: IntoIterator<Item = FieldRule>>(mut self, rules: I) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Declare a top-level field the store stamps at commit time. It never
    /// appears in the merged body.
    pub fn server_timestamp(mut self, field: &'static str) -> Self {
        self.server_timestamps.push(field);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn rule_for(&self, target: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.target == target)
    }
}

/// A value counts as present unless it is missing, `null`, or `""`.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Build one canonical document. The id is always the primary's id.
pub fn merge(
    primary: &SourceRecord,
    secondaries: &[Option<&SourceRecord>],
    spec: &FieldSpec,
) -> CanonicalDocument {
    let mut body = Map::new();
    for rule in &spec.rules {
        let chosen = rule
            .candidates
            .iter()
            .find_map(|candidate| candidate_value(primary, secondaries, candidate));
        let value = match chosen {
            Some(value) => Some(value),
            None => default_value(&rule.default, &body, primary),
        };
        if let Some(value) = value {
            insert_path(&mut body, rule.target, value);
        }
    }

    let mut document = CanonicalDocument::new(primary.id(), body);
    for field in &spec.server_timestamps {
        document.body.remove(*field);
        document = document.with_server_timestamp(*field);
    }
    document
}

fn candidate_value(
    primary: &SourceRecord,
    secondaries: &[Option<&SourceRecord>],
    candidate: &Candidate,
) -> Option<Value> {
    let source = match candidate.source {
        SourceRef::Primary => primary,
        SourceRef::Secondary(index) => secondaries.get(index).copied().flatten()?,
    };
    source.get(candidate.path).filter(is_present)
}

fn default_value(default: &FieldDefault, body: &Map<String, Value>, primary: &SourceRecord) -> Option<Value> {
    match default {
        FieldDefault::Value(value) => Some(value.clone()),
        FieldDefault::Omit => None,
        FieldDefault::Difference { minuend, subtrahend } => {
            let a = number_at(body, minuend)?;
            let b = number_at(body, subtrahend)?;
            subtract(a, b).map(Value::Number)
        }
        FieldDefault::Join(paths) => {
            let parts: Vec<&str> = paths
                .iter()
                .filter_map(|path| lookup_path(body, path).and_then(Value::as_str))
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            Some(Value::String(parts.join(" ")))
        }
        FieldDefault::SyntheticEmail { domain } => {
            Some(Value::String(format!("{}@{}", primary.id(), domain)))
        }
    }
}

fn number_at<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a Number> {
    match lookup_path(body, path)? {
        Value::Number(n) => Some(n),
        _ => None,
    }
}

fn subtract(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.checked_sub(y).map(Number::from);
    }
    Number::from_f64(a.as_f64()? - b.as_f64()?)
}

pub(crate) fn lookup_path<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub(crate) fn insert_path(body: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut current = body;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(leaf.to_string(), value);
}
