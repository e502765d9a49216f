use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

pub(crate) const DOC_ID: &str = "_id";
pub(crate) const DOC_REV: &str = "_rev";
pub(crate) const DOC_DELETED: &str = "_deleted";

/// One version of a stored JSON document.
///
/// The reserved keys `_id`, `_rev` and `_deleted` never appear in the body;
/// they are lifted into the typed fields when the revision is constructed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentRevision {
    id: Option<String>,
    rev: Option<String>,
    deleted: bool,
    body: Map<String, Value>,
}

impl DocumentRevision {
    /// Build a revision, stripping reserved keys from `body`.
    ///
    /// A `_deleted: true` entry in the body marks the revision as deleted.
    pub fn new(id: Option<String>, rev: Option<String>, mut body: Map<String, Value>) -> Self {
        body.remove(DOC_ID);
        body.remove(DOC_REV);
        let deleted = matches!(body.remove(DOC_DELETED), Some(Value::Bool(true)));

        Self {
            id,
            rev,
            deleted,
            body,
        }
    }

    /// A new document whose id is assigned by the server.
    pub fn from_body(body: Map<String, Value>) -> Self {
        Self::new(None, None, body)
    }

    pub fn with_id(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self::new(Some(id.into()), None, body)
    }

    /// Used by the codec once reserved keys have already been routed.
    pub(crate) fn from_parts(
        id: Option<String>,
        rev: Option<String>,
        deleted: bool,
        body: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            rev,
            deleted,
            body,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_body(self) -> Map<String, Value> {
        self.body
    }

    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    pub fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Replace the body. Reserved keys are dropped.
    pub fn set_body(&mut self, mut body: Map<String, Value>) {
        body.retain(|field, _| !is_reserved(field));
        self.body = body;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Insert a user field. Reserved keys are rejected.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let field = field.into();
        if is_reserved(&field) {
            return Err(Error::Validation(format!(
                "'{}' is a reserved document field",
                field
            )));
        }
        Ok(self.body.insert(field, value))
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.body.remove(field)
    }
}

pub(crate) fn is_reserved(field: &str) -> bool {
    matches!(field, DOC_ID | DOC_REV | DOC_DELETED)
}

/// Sort direction of an indexed or sorted field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field name with an optional direction.
///
/// Serializes as `{"name": "asc"}` when a direction is set, otherwise as the
/// bare field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub order: Option<SortOrder>,
}

impl SortField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
        }
    }

    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Some(SortOrder::Asc),
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Some(SortOrder::Desc),
        }
    }
}

impl Serialize for SortField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.order {
            Some(order) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&self.name, order.as_str())?;
                map.end()
            }
            None => serializer.serialize_str(&self.name),
        }
    }
}

/// Index kinds that can be created or deleted through the `_index` endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Json,
    Text,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Json => "json",
            IndexType::Text => "text",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of a field in a text index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextFieldType {
    String,
    Number,
    Boolean,
}

impl TextFieldType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(TextFieldType::String),
            "number" => Some(TextFieldType::Number),
            "boolean" => Some(TextFieldType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextIndexField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: TextFieldType,
}

impl TextIndexField {
    pub fn new(name: impl Into<String>, field_type: TextFieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Secondary index as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Design document holding the index; absent for the built-in `_all_docs` index
    pub design_doc: Option<String>,
    pub name: String,
    /// Raw index type (`json`, `text`, `special`, ...)
    pub index_type: String,
    pub fields: Vec<SortField>,
    /// Populated for text indexes only
    pub text_fields: Vec<TextIndexField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_new_strips_reserved_keys() {
        let doc = DocumentRevision::new(
            Some("doc1".to_string()),
            None,
            object(json!({"_id": "other", "_rev": "1-x", "_deleted": true, "name": "fred"})),
        );
        assert_eq!(doc.id(), Some("doc1"));
        assert_eq!(doc.rev(), None);
        assert!(doc.is_deleted());
        assert_eq!(doc.body().len(), 1);
        assert_eq!(doc.get("name"), Some(&json!("fred")));
    }

    #[test]
    fn test_deleted_false_in_body_is_not_a_tombstone() {
        let doc = DocumentRevision::from_body(object(json!({"_deleted": false, "a": 1})));
        assert!(!doc.is_deleted());
        assert!(doc.get("_deleted").is_none());
    }

    #[test]
    fn test_insert_rejects_reserved_fields() {
        let mut doc = DocumentRevision::default();
        assert!(doc.insert("_rev", json!("1-a")).is_err());
        assert!(doc.insert("rev", json!("user field")).is_ok());
        assert_eq!(doc.body().len(), 1);
    }

    #[test]
    fn test_sort_field_serialization() {
        let fields = vec![SortField::new("name"), SortField::desc("age")];
        assert_eq!(
            serde_json::to_value(&fields).unwrap(),
            json!(["name", {"age": "desc"}])
        );
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("asc"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("DESC"), None);
    }
}
