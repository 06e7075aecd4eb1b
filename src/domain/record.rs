//! Result records produced by a stream.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::{Result, StreamPrintError};

/// A named field within a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One immutable result row: an ordered set of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Build a record, rejecting duplicate field names.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StreamPrintError::InvalidRecord(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Build a record from a JSON object. Fields come out ordered by key.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(name, value)| Field {
                        name,
                        value: Value::from(value),
                    })
                    .collect(),
            }),
            other => Err(StreamPrintError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Look up a field value by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flat mapping from field name to raw value, as written by sinks.
    pub fn to_raw_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value.to_raw_value()))
            .collect()
    }
}

impl TryFrom<Vec<Field>> for Record {
    type Error = StreamPrintError;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Record::new(fields)
    }
}

impl From<Record> for Vec<Field> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_and_lookup() {
        let record = Record::new(vec![Field::new("id", 1i64), Field::new("name", "alice")]).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.value("name"), Some(&Value::from("alice")));
        assert_eq!(record.value("missing"), None);
        assert_eq!(record.field_names().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Record::new(vec![Field::new("id", 1i64), Field::new("id", 2i64)]);
        match result {
            Err(StreamPrintError::InvalidRecord(msg)) => assert!(msg.contains("id")),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_record() {
        let record = Record::new(vec![]).unwrap();
        assert!(record.is_empty());
        assert!(record.to_raw_map().is_empty());
    }

    #[test]
    fn test_from_json_object() {
        let record = Record::from_json(json!({"a": 1, "b": [true, null]})).unwrap();
        assert_eq!(record.value("a"), Some(&Value::Int(1)));
        assert_eq!(
            record.value("b"),
            Some(&Value::Tuple(vec![Value::Bool(true), Value::Null]))
        );
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Record::from_json(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_to_raw_map() {
        let record = Record::new(vec![Field::new("n", 2.5), Field::new("s", "x")]).unwrap();
        let map = record.to_raw_map();
        assert_eq!(serde_json::Value::Object(map), json!({"n": 2.5, "s": "x"}));
    }

    #[test]
    fn test_serde_rejects_duplicates() {
        let encoded = json!([
            {"name": "a", "value": {"int": 1}},
            {"name": "a", "value": {"int": 2}}
        ]);
        assert!(serde_json::from_value::<Record>(encoded).is_err());
    }

    #[test]
    fn test_serde_keeps_field_order() {
        let record = Record::new(vec![Field::new("z", 1i64), Field::new("a", 2i64)]).unwrap();
        let encoded = serde_json::to_vec(&record).unwrap();
        let decoded: Record = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.field_names().collect::<Vec<_>>(), vec!["z", "a"]);
    }
}
