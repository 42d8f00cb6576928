// Record reflection - type names and field access for arbitrary record types

use crate::error::{IndexerError, Result};
use heck::ToPascalCase;
use serde::{Deserialize, Serialize};

/// A record that can be indexed.
///
/// The indexer never sees concrete record types; it asks the record for its
/// type name and for the string form of individual fields.
pub trait Record {
    /// Stable fully-qualified type name. Usually `type_fqn::<Self>()`.
    fn type_name(&self) -> String;

    /// String value of a field. `None` if the record has no such field,
    /// `Some("")` if the field exists but is empty or unset.
    fn field_value(&self, field: &str) -> Option<String>;
}

impl<R: Record + ?Sized> Record for &R {
    fn type_name(&self) -> String {
        (**self).type_name()
    }

    fn field_value(&self, field: &str) -> Option<String> {
        (**self).field_value(field)
    }
}

/// Derive a stable `module.Type` name for `T`.
///
/// Generic arguments are dropped and only the last two path segments are
/// kept, so `my_app::accounts::Account` becomes `accounts.Account`.
pub fn type_fqn<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let segments: Vec<&str> = base.split("::").filter(|s| !s.is_empty()).collect();
    match segments.len() {
        0 => full.to_string(),
        1 => segments[0].to_string(),
        n => format!("{}.{}", segments[n - 2], segments[n - 1]),
    }
}

/// Normalize a field name to the PascalCase form indices are registered under.
pub fn normalize_field(field: &str) -> String {
    field.to_pascal_case()
}

/// Read a field the indexer requires, turning `None` into `MissingField`.
pub(crate) fn require_field<R: Record + ?Sized>(record: &R, field: &str) -> Result<String> {
    record
        .field_value(field)
        .ok_or_else(|| IndexerError::MissingField {
            type_name: record.type_name(),
            field: field.to_string(),
        })
}

/// A type-erased record backed by a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub type_name: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl DynamicRecord {
    /// Wrap a JSON object as a record of the given type.
    pub fn new(type_name: impl Into<String>, value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(fields) => Ok(DynamicRecord {
                type_name: type_name.into(),
                fields,
            }),
            other => Err(IndexerError::Other(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    /// Parse a JSON string into a record
    pub fn from_json(type_name: impl Into<String>, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::new(type_name, value)
    }

    /// Set a field, e.g. to persist a value assigned by an autoincrement index.
    pub fn set_field(&mut self, field: &str, value: serde_json::Value) {
        let key = self.resolve_key(field).unwrap_or_else(|| field.to_string());
        self.fields.insert(key, value);
    }

    fn resolve_key(&self, field: &str) -> Option<String> {
        if self.fields.contains_key(field) {
            return Some(field.to_string());
        }
        let wanted = normalize_field(field);
        self.fields
            .keys()
            .find(|k| normalize_field(k) == wanted)
            .cloned()
    }
}

impl Record for DynamicRecord {
    fn type_name(&self) -> String {
        self.type_name.clone()
    }

    fn field_value(&self, field: &str) -> Option<String> {
        let value = match self.resolve_key(field) {
            Some(key) => &self.fields[&key],
            // Absent keys in a JSON document are optional fields
            None => return Some(String::new()),
        };
        Some(match value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        })
    }
}
