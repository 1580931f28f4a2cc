//! Schemaless document representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identity field every schema with an `id` column uses.
pub const ID_FIELD: &str = "id";

/// One record of a table: a JSON object keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document from any JSON value; non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Serialize a typed record into a document.
    pub fn from_record<T: Serialize>(record: &T) -> crate::Result<Self> {
        let value = serde_json::to_value(record)?;
        Self::from_value(value).ok_or_else(|| {
            crate::Error::InvalidSchema("record does not serialize to an object".to_string())
        })
    }

    /// Deserialize this document into a typed record.
    pub fn to_record<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn id(&self) -> Option<u64> {
        self.0.get(ID_FIELD).and_then(Value::as_u64)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("x")).is_none());
        assert!(Document::from_value(json!({"a": 1})).is_some());
    }

    #[test]
    fn test_id_reads_unsigned_only() {
        let doc = Document::new().with("id", 7);
        assert_eq!(doc.id(), Some(7));
        let doc = Document::new().with("id", "7");
        assert_eq!(doc.id(), None);
    }
}
