//! Conversion between wire JSON and typed documents and index descriptors.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{
    DocumentRevision, Index, SortField, SortOrder, TextFieldType, TextIndexField, DOC_DELETED,
    DOC_ID, DOC_REV,
};

/// Parse a response body into JSON.
pub fn parse_json(content: &str) -> Result<Value> {
    serde_json::from_str(content).map_err(|e| Error::decode_json("response body is not valid JSON", e))
}

/// Decode one document object.
///
/// Only `_id`, `_rev` and `_deleted` are routed to the typed fields. Keys such
/// as `id` or `rev` are user data and stay in the body.
pub fn decode_document(value: Value) -> Result<DocumentRevision> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(Error::decode(format!(
                "expected a document object, found {}",
                json_type(&other)
            )))
        }
    };

    let mut id = None;
    let mut rev = None;
    let mut deleted = false;
    let mut body = Map::new();

    for (key, value) in object {
        match key.as_str() {
            DOC_ID => id = optional_string(DOC_ID, value)?,
            DOC_REV => rev = optional_string(DOC_REV, value)?,
            DOC_DELETED => {
                deleted = match value {
                    Value::Bool(flag) => flag,
                    Value::Null => false,
                    other => {
                        return Err(Error::decode(format!(
                            "'_deleted' must be a boolean, found {}",
                            json_type(&other)
                        )))
                    }
                }
            }
            _ => {
                body.insert(key, value);
            }
        }
    }

    Ok(DocumentRevision::from_parts(id, rev, deleted, body))
}

/// Encode a document as `_id`, `_rev`, `_deleted` (only when set), then the body in order.
pub fn encode_document(document: &DocumentRevision) -> Value {
    let mut object = Map::with_capacity(document.body().len() + 3);
    if let Some(id) = document.id() {
        object.insert(DOC_ID.to_string(), Value::String(id.to_string()));
    }
    if let Some(rev) = document.rev() {
        object.insert(DOC_REV.to_string(), Value::String(rev.to_string()));
    }
    if document.is_deleted() {
        object.insert(DOC_DELETED.to_string(), Value::Bool(true));
    }
    for (key, value) in document.body() {
        object.insert(key.clone(), value.clone());
    }
    Value::Object(object)
}

impl Serialize for DocumentRevision {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = self.id() {
            map.serialize_entry(DOC_ID, id)?;
        }
        if let Some(rev) = self.rev() {
            map.serialize_entry(DOC_REV, rev)?;
        }
        if self.is_deleted() {
            map.serialize_entry(DOC_DELETED, &true)?;
        }
        for (key, value) in self.body() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Decode the `docs` array of a query response.
///
/// Every entry must carry both an id and a revision.
pub fn decode_documents(value: Value) -> Result<Vec<DocumentRevision>> {
    let docs = match value {
        Value::Object(mut object) => object.remove("docs"),
        _ => None,
    };
    let Some(Value::Array(docs)) = docs else {
        return Err(Error::decode("response has no 'docs' array"));
    };

    docs.into_iter()
        .enumerate()
        .map(|(position, entry)| {
            let document = decode_document(entry)?;
            if document.id().is_none() {
                return Err(Error::decode(format!(
                    "document at position {} has no id",
                    position
                )));
            }
            if document.rev().is_none() {
                return Err(Error::decode(format!(
                    "document at position {} has no rev",
                    position
                )));
            }
            Ok(document)
        })
        .collect()
}

/// Decode the `indexes` array of a list-indexes response.
pub fn decode_indexes(value: Value) -> Result<Vec<Index>> {
    let Some(entries) = value.get("indexes").and_then(Value::as_array) else {
        return Err(Error::decode("response has no 'indexes' array"));
    };

    entries.iter().map(decode_index).collect()
}

fn decode_index(entry: &Value) -> Result<Index> {
    let name = required_str(entry, "name")?.to_string();
    let index_type = required_str(entry, "type")?.to_string();
    let design_doc = match entry.get("ddoc") {
        None | Some(Value::Null) => None,
        Some(Value::String(ddoc)) => Some(ddoc.clone()),
        Some(other) => {
            return Err(Error::decode(format!(
                "index '{}' has a non-string ddoc ({})",
                name,
                json_type(other)
            )))
        }
    };

    let definitions = match entry.get("def").and_then(|def| def.get("fields")) {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(fields)) => fields.as_slice(),
        Some(other) => {
            return Err(Error::decode(format!(
                "index '{}' has non-array def.fields ({})",
                name,
                json_type(other)
            )))
        }
    };

    let mut fields = Vec::new();
    let mut text_fields = Vec::new();
    for definition in definitions {
        let (field, spec) = single_entry(&name, definition)?;
        if index_type == "text" {
            let field_type = TextFieldType::parse(spec).ok_or_else(|| {
                Error::decode(format!(
                    "index '{}' field '{}' has unknown text type '{}'",
                    name, field, spec
                ))
            })?;
            text_fields.push(TextIndexField::new(field, field_type));
        } else {
            let order = SortOrder::parse(spec).ok_or_else(|| {
                Error::decode(format!(
                    "index '{}' field '{}' has unknown sort order '{}'",
                    name, field, spec
                ))
            })?;
            fields.push(SortField {
                name: field.to_string(),
                order: Some(order),
            });
        }
    }

    Ok(Index {
        design_doc,
        name,
        index_type,
        fields,
        text_fields,
    })
}

/// A `def.fields` entry is an object with exactly one `field: value` pair.
fn single_entry<'a>(index: &str, definition: &'a Value) -> Result<(&'a str, &'a str)> {
    let mut pairs = definition.as_object().into_iter().flatten();
    match (pairs.next(), pairs.next()) {
        (Some((field, Value::String(spec))), None) => Ok((field.as_str(), spec.as_str())),
        _ => Err(Error::decode(format!(
            "index '{}' has a malformed field definition: {}",
            index, definition
        ))),
    }
}

fn required_str<'a>(entry: &'a Value, key: &str) -> Result<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::decode(format!("index entry is missing string field '{}'", key)))
}

fn optional_string(key: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => Err(Error::decode(format!(
            "'{}' must be a string, found {}",
            key,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
