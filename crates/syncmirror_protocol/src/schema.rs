//! Field schemas and non-fatal shape checks.

use crate::record::{
    Record, COL_ARCHIVED, COL_ATTRIBUTES, COL_CAN_UPDATE, COL_CREATED, COL_ID, COL_LIFETIME,
    COL_UPDATED,
};
use crate::value::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The declared field layout of one entity type.
///
/// The global bookkeeping columns are implicit: every schema answers for
/// them without declaring them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl FieldSchema {
    /// Creates an empty schema (global columns only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Returns the declared kind of a field, including global columns.
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        if let Some(kind) = self.fields.get(field) {
            return Some(*kind);
        }
        global_column_kind(field)
    }

    /// Returns true if the field is declared or global.
    pub fn declares(&self, field: &str) -> bool {
        self.kind_of(field).is_some()
    }

    /// Iterates over the declared (non-global) fields.
    pub fn declared_fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns the number of declared (non-global) fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks a record against this schema.
    ///
    /// Absent fields are never an issue: partial records under field-level
    /// permissions are expected. Returns the list of mismatches so the
    /// caller can log them; shape problems are not errors.
    pub fn check(&self, record: &Record) -> Vec<ShapeIssue> {
        let mut issues = Vec::new();
        for (name, value) in record.iter() {
            match self.kind_of(name) {
                None => issues.push(ShapeIssue {
                    field: name.to_string(),
                    expected: None,
                    actual: value.kind(),
                }),
                Some(expected) if !value.matches(expected) => issues.push(ShapeIssue {
                    field: name.to_string(),
                    expected: Some(expected),
                    actual: value.kind(),
                }),
                Some(_) => {}
            }
        }
        issues
    }
}

/// Returns the kind of a global bookkeeping column.
fn global_column_kind(field: &str) -> Option<FieldKind> {
    match field {
        COL_ID => Some(FieldKind::String),
        COL_CREATED | COL_UPDATED => Some(FieldKind::Date),
        COL_ARCHIVED | COL_CAN_UPDATE => Some(FieldKind::Boolean),
        // Attribute lists arrive pre-serialized.
        COL_ATTRIBUTES => Some(FieldKind::String),
        COL_LIFETIME => Some(FieldKind::Number),
        _ => None,
    }
}

/// One mismatch between a record and its declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeIssue {
    /// The offending field name.
    pub field: String,
    /// The declared kind, or `None` for an undeclared field.
    pub expected: Option<FieldKind>,
    /// The kind actually carried.
    pub actual: FieldKind,
}

impl fmt::Display for ShapeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected {
            Some(expected) => write!(
                f,
                "field '{}' is {} but schema declares {}",
                self.field,
                self.actual.name(),
                expected.name()
            ),
            None => write!(
                f,
                "field '{}' ({}) is not declared in the schema",
                self.field,
                self.actual.name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn schema() -> FieldSchema {
        FieldSchema::new()
            .with_field("title", FieldKind::String)
            .with_field("count", FieldKind::Number)
    }

    #[test]
    fn global_columns_are_implicit() {
        let s = FieldSchema::new();
        assert_eq!(s.kind_of("id"), Some(FieldKind::String));
        assert_eq!(s.kind_of("created"), Some(FieldKind::Date));
        assert_eq!(s.kind_of("archived"), Some(FieldKind::Boolean));
        assert_eq!(s.kind_of("lifetime"), Some(FieldKind::Number));
        assert_eq!(s.kind_of("title"), None);
    }

    #[test]
    fn check_accepts_partial_records() {
        let s = schema();
        // Only one of two declared fields present; absence is fine.
        let mut r = Record::with_id("e-1");
        r.set("title", FieldValue::from("hello"));
        assert!(s.check(&r).is_empty());
    }

    #[test]
    fn check_reports_kind_mismatch() {
        let s = schema();
        let mut r = Record::new();
        r.set("count", FieldValue::from("not a number"));

        let issues = s.check(&r);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "count");
        assert_eq!(issues[0].expected, Some(FieldKind::Number));
        assert_eq!(issues[0].actual, FieldKind::String);
        assert!(issues[0].to_string().contains("count"));
    }

    #[test]
    fn check_reports_undeclared_field() {
        let s = schema();
        let mut r = Record::new();
        r.set("rogue", FieldValue::Boolean(true));

        let issues = s.check(&r);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].expected, None);
    }
}
