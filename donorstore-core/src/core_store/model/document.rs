/*
    document.rs - Donor documents held by the store

    A document is an arbitrary JSON object plus the `_id` assigned by the
    identifier allocator at write time.
*/

use super::types::DocumentId;
use crate::core_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute map of a document, without its id
pub type Record = Map<String, Value>;

/// Key under which the document id is stored
pub const ID_FIELD: &str = "_id";

/// A materialized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,

    #[serde(flatten)]
    pub fields: Record,
}

impl Document {
    pub fn new(id: DocumentId, fields: Record) -> Self {
        Document { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Render as a single JSON object including `_id`
    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_string(), Value::from(self.id.0));
        for (k, v) in &self.fields {
            object.insert(k.clone(), v.clone());
        }
        Value::Object(object)
    }
}

/// Turn any serializable value into a record.
///
/// The value must serialize to a JSON object. A caller-supplied `_id` is
/// discarded: ids only come from the allocator.
pub fn to_record<T: Serialize + ?Sized>(value: &T) -> StoreResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut map)) => {
            map.remove(ID_FIELD);
            Ok(map)
        }
        Ok(other) => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_record_strips_id() {
        let record = to_record(&json!({"_id": 99, "name": "Alice"})).unwrap();
        assert!(record.get(ID_FIELD).is_none());
        assert_eq!(record.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_to_record_rejects_non_objects() {
        let err = to_record(&json!(["Alice"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_to_record_from_struct() {
        #[derive(Serialize)]
        struct Donor {
            name: String,
            blood_group: String,
        }

        let record = to_record(&Donor {
            name: "Bob".to_string(),
            blood_group: "O+".to_string(),
        })
        .unwrap();
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_document_json_shape() {
        let doc = Document::new(DocumentId(1), to_record(&json!({"name": "Alice"})).unwrap());
        assert_eq!(doc.to_json(), json!({"_id": 1, "name": "Alice"}));
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"_id": 1, "name": "Alice"}));

        let parsed: Document = serde_json::from_value(json!({"_id": 7, "city": "Pune"})).unwrap();
        assert_eq!(parsed.id, DocumentId(7));
        assert_eq!(parsed.get("city"), Some(&json!("Pune")));
    }
}
