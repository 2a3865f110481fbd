//! Partial entity records.

use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The identity column present on every entity.
pub const COL_ID: &str = "id";
/// Creation instant, set by the server.
pub const COL_CREATED: &str = "created";
/// Last-update instant, set by the server.
pub const COL_UPDATED: &str = "updated";
/// Archive flag, toggled by archive/restore events.
pub const COL_ARCHIVED: &str = "archived";
/// Serialized attribute list, set by the server.
pub const COL_ATTRIBUTES: &str = "attributes";
/// Retention lifetime, set by the server.
pub const COL_LIFETIME: &str = "lifetime";
/// Whether the caller may update this entity, set by the server.
pub const COL_CAN_UPDATE: &str = "canUpdate";

/// The bookkeeping columns present on every entity type.
pub const GLOBAL_COLUMNS: [&str; 7] = [
    COL_ID,
    COL_CREATED,
    COL_UPDATED,
    COL_ARCHIVED,
    COL_ATTRIBUTES,
    COL_LIFETIME,
    COL_CAN_UPDATE,
];

/// Columns owned by the server. These are stripped from outgoing mutation
/// payloads; only the realtime echo may change them locally.
pub const SERVER_OWNED_COLUMNS: [&str; 6] = [
    COL_CREATED,
    COL_UPDATED,
    COL_ARCHIVED,
    COL_ATTRIBUTES,
    COL_LIFETIME,
    COL_CAN_UPDATE,
];

/// A possibly-partial map of field name to value.
///
/// # Read visibility
///
/// A field absent from a record means the caller lacks read permission for
/// it, not that the field is empty. Nothing in this type defaults missing
/// fields; callers must treat absence as "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record carrying only an identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.set(COL_ID, FieldValue::Text(id.into()));
        record
    }

    /// Returns the entity identity, if present.
    pub fn id(&self) -> Option<&str> {
        self.get(COL_ID).and_then(FieldValue::as_text)
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value if any.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field.into(), value)
    }

    /// Removes a field, returning its value if it was present.
    pub fn unset(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    /// Returns true if the field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the archive flag, if visible.
    pub fn archived(&self) -> Option<bool> {
        self.get(COL_ARCHIVED).and_then(FieldValue::as_boolean)
    }

    /// Returns true if the record is visibly archived.
    pub fn is_archived(&self) -> bool {
        self.archived().unwrap_or(false)
    }

    /// Sets the archive flag.
    pub fn set_archived(&mut self, archived: bool) {
        self.set(COL_ARCHIVED, FieldValue::Boolean(archived));
    }

    /// Iterates over all present fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the names of all present fields.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of present fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replaces the listed fields with values from `other`.
    ///
    /// Fields absent from `other` are left untouched: a partial record must
    /// never erase fields it does not carry.
    pub fn merge(&mut self, other: &Record) {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
    }

    /// Replaces fields from an explicit list.
    pub fn merge_fields<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        for (name, value) in fields {
            self.set(name, value);
        }
    }

    /// Returns a copy suitable for an outgoing mutation payload.
    ///
    /// Server-owned columns are stripped; the identity is kept for
    /// addressing.
    pub fn outgoing_payload(&self) -> Record {
        let mut out = self.clone();
        for column in SERVER_OWNED_COLUMNS {
            out.unset(column);
        }
        out
    }

    /// Returns the names of fields whose values differ from `other`.
    ///
    /// A field counts as differing when it is present in exactly one of the
    /// two records, or present in both with unequal values.
    pub fn differing_fields(&self, other: &Record) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (name, value) in self.iter() {
            if other.get(name) != Some(value) {
                names.push(name.to_string());
            }
        }
        for (name, _) in other.iter() {
            if !self.contains(name) {
                names.push(name.to_string());
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn identity_access() {
        let r = Record::with_id("e-1");
        assert_eq!(r.id(), Some("e-1"));
        assert!(Record::new().id().is_none());
    }

    #[test]
    fn absent_fields_stay_absent() {
        let r = record(&[("title", FieldValue::from("hello"))]);
        assert!(r.get("body").is_none());
        assert_eq!(r.archived(), None);
        assert!(!r.is_archived());
    }

    #[test]
    fn merge_keeps_uncarried_fields() {
        let mut base = record(&[
            ("title", FieldValue::from("old")),
            ("body", FieldValue::from("text")),
        ]);
        let incoming = record(&[("title", FieldValue::from("new"))]);

        base.merge(&incoming);

        assert_eq!(base.get("title").and_then(FieldValue::as_text), Some("new"));
        // "body" was not in the partial update and must survive
        assert_eq!(base.get("body").and_then(FieldValue::as_text), Some("text"));
    }

    #[test]
    fn outgoing_payload_strips_server_columns() {
        let mut r = Record::with_id("e-1");
        r.set("title", FieldValue::from("t"));
        r.set(COL_CREATED, FieldValue::Date(1));
        r.set(COL_UPDATED, FieldValue::Date(2));
        r.set_archived(true);
        r.set(COL_LIFETIME, FieldValue::Number(30.0));
        r.set(COL_ATTRIBUTES, FieldValue::from("[]"));
        r.set(COL_CAN_UPDATE, FieldValue::Boolean(true));

        let payload = r.outgoing_payload();
        assert_eq!(payload.id(), Some("e-1"));
        assert!(payload.contains("title"));
        for column in SERVER_OWNED_COLUMNS {
            assert!(!payload.contains(column), "{column} should be stripped");
        }
    }

    #[test]
    fn differing_fields_covers_both_sides() {
        let a = record(&[
            ("x", FieldValue::Number(1.0)),
            ("y", FieldValue::Number(2.0)),
        ]);
        let b = record(&[
            ("x", FieldValue::Number(1.0)),
            ("y", FieldValue::Number(3.0)),
            ("z", FieldValue::Number(4.0)),
        ]);

        assert_eq!(a.differing_fields(&b), vec!["y".to_string(), "z".to_string()]);
        assert!(a.differing_fields(&a).is_empty());
    }
}
