//! Request bodies for creating indexes.

use couchlink_core::{Error, IndexType, Result, SortField, TextFieldType, TextIndexField};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON index over one or more sorted fields.
#[derive(Debug, Clone, Default)]
pub struct JsonIndex {
    name: Option<String>,
    design_doc: Option<String>,
    fields: Vec<SortField>,
    partial_filter_selector: Option<Value>,
}

impl JsonIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn design_doc(mut self, design_doc: impl Into<String>) -> Self {
        self.design_doc = Some(design_doc.into());
        self
    }

    pub fn field(mut self, field: SortField) -> Self {
        self.fields.push(field);
        self
    }

    /// Only index documents matching this selector.
    pub fn partial_filter_selector(mut self, selector: Value) -> Self {
        self.partial_filter_selector = Some(selector);
        self
    }

    pub(crate) fn to_request(&self) -> Result<CreateIndexRequest<'_, JsonIndexDefinition<'_>>> {
        if self.fields.is_empty() {
            return Err(Error::Validation(
                "a JSON index needs at least one field".to_string(),
            ));
        }
        Ok(CreateIndexRequest {
            index_type: IndexType::Json,
            index: JsonIndexDefinition {
                fields: &self.fields,
                partial_filter_selector: self.partial_filter_selector.as_ref(),
            },
            name: self.name.as_deref(),
            ddoc: self.design_doc.as_deref(),
        })
    }
}

/// A full-text index.
///
/// With no fields configured every field of every document is indexed.
#[derive(Debug, Clone)]
pub struct TextIndex {
    name: Option<String>,
    design_doc: Option<String>,
    fields: Option<Vec<TextIndexField>>,
    selector: Option<Value>,
    default_field_enabled: bool,
    default_field_analyzer: Option<String>,
}

impl Default for TextIndex {
    fn default() -> Self {
        Self {
            name: None,
            design_doc: None,
            fields: None,
            selector: None,
            default_field_enabled: true,
            default_field_analyzer: None,
        }
    }
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn design_doc(mut self, design_doc: impl Into<String>) -> Self {
        self.design_doc = Some(design_doc.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: TextFieldType) -> Self {
        self.fields
            .get_or_insert_with(Vec::new)
            .push(TextIndexField::new(name, field_type));
        self
    }

    /// Send an explicit empty field list.
    pub fn all_fields(mut self) -> Self {
        self.fields = Some(Vec::new());
        self
    }

    pub fn selector(mut self, selector: Value) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn default_field(mut self, enabled: bool, analyzer: Option<&str>) -> Self {
        self.default_field_enabled = enabled;
        self.default_field_analyzer = analyzer.map(str::to_string);
        self
    }

    pub(crate) fn to_request(&self) -> CreateIndexRequest<'_, TextIndexDefinition<'_>> {
        CreateIndexRequest {
            index_type: IndexType::Text,
            index: TextIndexDefinition {
                fields: self.fields.as_deref(),
                selector: self.selector.as_ref(),
                default_field: DefaultField {
                    enabled: self.default_field_enabled,
                    analyzer: self.default_field_analyzer.as_deref(),
                },
            },
            name: self.name.as_deref(),
            ddoc: self.design_doc.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIndexRequest<'a, D> {
    #[serde(rename = "type")]
    index_type: IndexType,
    index: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ddoc: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonIndexDefinition<'a> {
    fields: &'a [SortField],
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_filter_selector: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TextIndexDefinition<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [TextIndexField]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a Value>,
    default_field: DefaultField<'a>,
}

#[derive(Debug, Serialize)]
struct DefaultField<'a> {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    analyzer: Option<&'a str>,
}

/// Server reply to an index creation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreatedIndex {
    /// `created`, or `exists` when an identical index was already there
    pub result: String,
    #[serde(rename = "id")]
    pub design_doc: String,
    pub name: String,
}

impl CreatedIndex {
    pub fn is_new(&self) -> bool {
        self.result == "created"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_index_body() {
        let index = JsonIndex::new()
            .name("by-age")
            .design_doc("ddoc")
            .field(SortField::desc("age"))
            .field(SortField::new("name"));
        let body = serde_json::to_value(index.to_request().unwrap()).unwrap();

        assert_eq!(
            body,
            json!({
                "type": "json",
                "index": {"fields": [{"age": "desc"}, "name"]},
                "name": "by-age",
                "ddoc": "ddoc"
            })
        );
    }

    #[test]
    fn test_json_index_without_fields_is_rejected() {
        let err = JsonIndex::new().name("empty").to_request().unwrap_err();
        assert_eq!(err.kind(), couchlink_core::ErrorKind::Validation);
    }

    #[test]
    fn test_text_index_body() {
        let index = TextIndex::new()
            .name("search")
            .field("title", TextFieldType::String)
            .field("year", TextFieldType::Number)
            .selector(json!({"type": "book"}))
            .default_field(true, Some("english"));
        let body = serde_json::to_value(index.to_request()).unwrap();

        assert_eq!(
            body,
            json!({
                "type": "text",
                "index": {
                    "fields": [
                        {"name": "title", "type": "string"},
                        {"name": "year", "type": "number"}
                    ],
                    "selector": {"type": "book"},
                    "default_field": {"enabled": true, "analyzer": "english"}
                },
                "name": "search"
            })
        );
    }

    #[test]
    fn test_text_index_field_list_presence() {
        let omitted = serde_json::to_value(TextIndex::new().to_request()).unwrap();
        assert_eq!(
            omitted,
            json!({"type": "text", "index": {"default_field": {"enabled": true}}})
        );

        let empty = serde_json::to_value(TextIndex::new().all_fields().to_request()).unwrap();
        assert_eq!(empty["index"]["fields"], json!([]));
    }

    #[test]
    fn test_created_index_reply() {
        let created: CreatedIndex = serde_json::from_value(json!({
            "result": "exists",
            "id": "_design/ddoc",
            "name": "by-age"
        }))
        .unwrap();
        assert!(!created.is_new());
        assert_eq!(created.design_doc, "_design/ddoc");
    }
}
