use couchlink_core::{DocumentRevision, SortField};
use serde::Serialize;
use serde_json::Value;

/// Index a query should use: a design document, or a design document and index name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UseIndex {
    DesignDoc(String),
    Named(String, String),
}

/// Body of a `_find` request
///
/// Options left unset are not sent, so the server defaults apply.
#[derive(Debug, Clone, Serialize)]
pub struct FindQuery {
    selector: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<Vec<SortField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bookmark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_index: Option<UseIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r: Option<u32>,
}

impl FindQuery {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            fields: None,
            limit: None,
            skip: None,
            sort: None,
            bookmark: None,
            use_index: None,
            r: None,
        }
    }

    pub fn selector(&self) -> &Value {
        &self.selector
    }

    /// Only return these fields. `_id` and `_rev` are needed to decode results.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, field: SortField) -> Self {
        self.sort.get_or_insert_with(Vec::new).push(field);
        self
    }

    pub fn bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }

    pub fn use_index(mut self, use_index: UseIndex) -> Self {
        self.use_index = Some(use_index);
        self
    }

    /// Read quorum
    pub fn r(mut self, r: u32) -> Self {
        self.r = Some(r);
        self
    }
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub docs: Vec<DocumentRevision>,
    /// Pass to [`FindQuery::bookmark`] to fetch the next page
    pub bookmark: Option<String>,
    pub warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_query_sends_only_selector() {
        let query = FindQuery::new(json!({"age": {"$gt": 5}}));
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"selector": {"age": {"$gt": 5}}})
        );
    }

    #[test]
    fn test_full_query_body() {
        let query = FindQuery::new(json!({"name": "fred"}))
            .fields(["_id", "_rev", "name"])
            .limit(10)
            .skip(20)
            .sort(SortField::desc("age"))
            .sort(SortField::new("name"))
            .bookmark("g1AAAA")
            .use_index(UseIndex::Named("_design/ddoc".to_string(), "by-age".to_string()))
            .r(2);

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "selector": {"name": "fred"},
                "fields": ["_id", "_rev", "name"],
                "limit": 10,
                "skip": 20,
                "sort": [{"age": "desc"}, "name"],
                "bookmark": "g1AAAA",
                "use_index": ["_design/ddoc", "by-age"],
                "r": 2
            })
        );
    }

    #[test]
    fn test_use_index_design_doc_only() {
        let query = FindQuery::new(json!({})).use_index(UseIndex::DesignDoc("ddoc".to_string()));
        assert_eq!(serde_json::to_value(&query).unwrap()["use_index"], json!("ddoc"));
    }
}
