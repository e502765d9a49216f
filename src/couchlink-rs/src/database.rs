use couchlink_core::codec::{decode_document, decode_documents, decode_indexes, parse_json};
use couchlink_core::paths::{encode_design_doc, encode_segment};
use couchlink_core::{
    DocumentRevision, Error, HttpPipeline, Index, IndexType, JsonBody, Operation, Result,
};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::index::{CreatedIndex, JsonIndex, TextIndex};
use crate::query::{FindQuery, QueryPage};

/// Longest response body excerpt carried in an error message
const BODY_SNIPPET_LEN: usize = 200;

/// Operations on one database
#[derive(Clone)]
pub struct Database {
    pipeline: Arc<HttpPipeline>,
    name: String,
    path: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    id: String,
    rev: String,
}

#[derive(Deserialize)]
struct DeleteResponse {
    rev: Option<String>,
}

impl Database {
    pub(crate) fn new(pipeline: Arc<HttpPipeline>, name: &str) -> Self {
        Self {
            pipeline,
            name: name.to_string(),
            path: encode_segment(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the database. An existing database counts as success.
    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn ensure_exists(&self) -> Result<()> {
        let response = self.pipeline.put(&self.path, None, None).await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::info!("Database created");
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => {
                tracing::debug!("Database already exists");
                Ok(())
            }
            _ => Err(modification_failure(Operation::CreateDatabase, response).await),
        }
    }

    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn delete(&self) -> Result<()> {
        let response = self.pipeline.delete(&self.path, None).await?;
        if response.status() != StatusCode::OK {
            return Err(modification_failure(Operation::DeleteDatabase, response).await);
        }
        tracing::info!("Database deleted");
        Ok(())
    }

    /// Store a new document.
    ///
    /// With an id the document is `PUT` under it, otherwise the server assigns
    /// one. The returned revision carries the new id and rev and the same body.
    #[tracing::instrument(skip(self, document), fields(db = %self.name, id = ?document.id()))]
    pub async fn create(&self, document: DocumentRevision) -> Result<DocumentRevision> {
        let body = JsonBody::new(&document)?;
        let response = match document.id() {
            Some(id) => {
                let uri = self.document_uri(id)?;
                self.pipeline.put(&uri, None, Some(body)).await?
            }
            None => self.pipeline.post(&self.path, None, Some(body)).await?,
        };
        self.written(response, document).await
    }

    /// Store a new revision of an existing document. Needs both id and rev.
    #[tracing::instrument(skip(self, document), fields(db = %self.name, id = ?document.id()))]
    pub async fn update(&self, document: DocumentRevision) -> Result<DocumentRevision> {
        let id = document
            .id()
            .ok_or_else(|| Error::Validation("an update needs a document id".to_string()))?;
        if document.rev().is_none() {
            return Err(Error::Validation(format!(
                "an update of '{}' needs the current revision",
                id
            )));
        }

        let uri = self.document_uri(id)?;
        let body = JsonBody::new(&document)?;
        let response = self.pipeline.put(&uri, None, Some(body)).await?;
        self.written(response, document).await
    }

    /// Fetch the current revision of a document.
    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn read(&self, id: &str) -> Result<DocumentRevision> {
        let uri = self.document_uri(id)?;
        self.fetch(&uri).await
    }

    /// Fetch a specific revision of a document.
    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn read_revision(&self, id: &str, rev: &str) -> Result<DocumentRevision> {
        let uri = format!("{}?rev={}", self.document_uri(id)?, self.revision_param(rev)?);
        self.fetch(&uri).await
    }

    /// Delete a document revision, returning the revision of the tombstone.
    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn delete_document(&self, id: &str, rev: &str) -> Result<String> {
        let uri = format!("{}?rev={}", self.document_uri(id)?, self.revision_param(rev)?);
        let response = self.pipeline.delete(&uri, None).await?;
        if !response.status().is_success() {
            return Err(modification_failure(Operation::DeleteDocument, response).await);
        }

        let reply: DeleteResponse = read_json(response).await?;
        reply
            .rev
            .ok_or_else(|| Error::decode("delete response has no 'rev'"))
    }

    #[tracing::instrument(skip(self, index), fields(db = %self.name))]
    pub async fn create_json_index(&self, index: &JsonIndex) -> Result<CreatedIndex> {
        let body = JsonBody::new(&index.to_request()?)?;
        self.create_index(body).await
    }

    #[tracing::instrument(skip(self, index), fields(db = %self.name))]
    pub async fn create_text_index(&self, index: &TextIndex) -> Result<CreatedIndex> {
        let body = JsonBody::new(&index.to_request())?;
        self.create_index(body).await
    }

    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn list_indexes(&self) -> Result<Vec<Index>> {
        let uri = format!("{}/_index/", self.path);
        let response = self.pipeline.get(&uri, None).await?;
        if response.status() != StatusCode::OK {
            return Err(read_failure(Operation::ListIndexes, response).await);
        }
        decode_indexes(read_value(response).await?)
    }

    /// Delete an index. Deleting an index that does not exist is an error.
    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub async fn delete_index(
        &self,
        name: &str,
        design_doc: &str,
        index_type: IndexType,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("index name must not be empty".to_string()));
        }
        if design_doc.is_empty() {
            return Err(Error::Validation(
                "design document must not be empty".to_string(),
            ));
        }

        let uri = format!(
            "{}/_index/{}/{}/{}",
            self.path,
            encode_design_doc(design_doc),
            index_type,
            encode_segment(name)
        );
        let response = self.pipeline.delete(&uri, None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::ModificationFailure {
                operation: Operation::DeleteIndex,
                status: Some(status.as_u16()),
                message: format!(
                    "index '{}' in design document '{}' does not exist",
                    name, design_doc
                ),
            });
        }
        if !status.is_success() {
            return Err(modification_failure(Operation::DeleteIndex, response).await);
        }
        tracing::info!(index = name, design_doc, "Index deleted");
        Ok(())
    }

    /// Run a query and return the matching documents.
    pub async fn query(&self, query: &FindQuery) -> Result<Vec<DocumentRevision>> {
        Ok(self.query_page(query).await?.docs)
    }

    /// Run a query, keeping the bookmark and any server warning.
    #[tracing::instrument(skip(self, query), fields(db = %self.name))]
    pub async fn query_page(&self, query: &FindQuery) -> Result<QueryPage> {
        let uri = format!("{}/_find", self.path);
        let body = JsonBody::new(query)?;
        let response = self.pipeline.post(&uri, None, Some(body)).await?;
        if response.status() != StatusCode::OK {
            return Err(read_failure(Operation::Query, response).await);
        }

        let value = read_value(response).await?;
        let bookmark = string_field(&value, "bookmark");
        let warning = string_field(&value, "warning");
        if let Some(warning) = &warning {
            tracing::warn!(warning = %warning, "Query warning from server");
        }
        let docs = decode_documents(value)?;
        tracing::debug!(count = docs.len(), "Query returned documents");

        Ok(QueryPage {
            docs,
            bookmark,
            warning,
        })
    }

    async fn create_index(&self, body: JsonBody) -> Result<CreatedIndex> {
        let uri = format!("{}/_index", self.path);
        let response = self.pipeline.post(&uri, None, Some(body)).await?;
        if !response.status().is_success() {
            return Err(modification_failure(Operation::CreateIndex, response).await);
        }
        let created: CreatedIndex = read_json(response).await?;
        tracing::info!(index = %created.name, design_doc = %created.design_doc, result = %created.result, "Index ready");
        Ok(created)
    }

    async fn fetch(&self, uri: &str) -> Result<DocumentRevision> {
        let response = self.pipeline.get(uri, None).await?;
        if response.status() != StatusCode::OK {
            return Err(read_failure(Operation::FetchDocument, response).await);
        }
        decode_document(read_value(response).await?)
    }

    async fn written(
        &self,
        response: Response,
        document: DocumentRevision,
    ) -> Result<DocumentRevision> {
        if !response.status().is_success() {
            return Err(modification_failure(Operation::SaveDocument, response).await);
        }
        let reply: WriteResponse = read_json(response).await?;
        tracing::debug!(id = %reply.id, rev = %reply.rev, "Document saved");
        Ok(DocumentRevision::new(
            Some(reply.id),
            Some(reply.rev),
            document.into_body(),
        ))
    }

    fn document_uri(&self, id: &str) -> Result<String> {
        if id.is_empty() {
            return Err(Error::Validation("document id must not be empty".to_string()));
        }
        Ok(format!("{}/{}", self.path, encode_segment(id)))
    }

    fn revision_param(&self, rev: &str) -> Result<String> {
        if rev.is_empty() {
            return Err(Error::Validation("revision must not be empty".to_string()));
        }
        Ok(encode_segment(rev))
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

async fn read_value(response: Response) -> Result<Value> {
    let text = response.text().await?;
    parse_json(&text)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let value = read_value(response).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::decode_json("unexpected response shape", e))
}

/// `status reason: body excerpt`
async fn failure_message(response: Response) -> (u16, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let mut snippet: String = body.trim().chars().take(BODY_SNIPPET_LEN).collect();
    if body.trim().chars().count() > BODY_SNIPPET_LEN {
        snippet.push_str("...");
    }
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let message = if snippet.is_empty() {
        format!("{} {}", status.as_u16(), reason)
    } else {
        format!("{} {}: {}", status.as_u16(), reason, snippet)
    };
    (status.as_u16(), message)
}

async fn modification_failure(operation: Operation, response: Response) -> Error {
    let (status, message) = failure_message(response).await;
    tracing::warn!(%operation, status, "Modification failed");
    Error::ModificationFailure {
        operation,
        status: Some(status),
        message,
    }
}

async fn read_failure(operation: Operation, response: Response) -> Error {
    let (status, message) = failure_message(response).await;
    tracing::debug!(%operation, status, "Read failed");
    Error::ReadFailure {
        operation,
        status: Some(status),
        message,
    }
}
