use anyhow::{Context, Result};
use couchlink_rs::{
    Client, ClientConfig, DocumentRevision, FindQuery, IndexType, JsonIndex, SortField,
};
use serde_json::json;

mod telemetry;

const CONFIG_PATH: &str = "config.json";
const SAMPLE_DESIGN_DOC: &str = "couchlink-sample";
const SAMPLE_INDEX: &str = "by-age";

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = telemetry::init_telemetry()?;

    let config = ClientConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        tracing::warn!("Failed to load {}, using defaults: {}", CONFIG_PATH, e);
        ClientConfig::default()
    });

    tracing::info!("couchlink starting");
    tracing::info!("  Account URL: {}", config.account_url);
    tracing::info!("  Database: {}", config.database);
    tracing::info!(
        "  Auth: {:?} (credentials {})",
        config.auth,
        if config.username.is_some() { "set" } else { "not set" }
    );
    tracing::info!(
        "  Max attempts: {}, request timeout: {}s",
        config.max_attempts,
        config.request_timeout_secs
    );

    let client = Client::from_config(&config).context("invalid client configuration")?;
    let db = client.database(&config.database)?;

    db.ensure_exists().await?;
    tracing::info!("✓ Database '{}' ready", db.name());

    let doc_id = uuid::Uuid::new_v4().to_string();
    let mut body = serde_json::Map::new();
    body.insert("name".to_string(), json!("fred"));
    body.insert("age".to_string(), json!(42));
    body.insert("tags".to_string(), json!(["sample"]));
    let created = db.create(DocumentRevision::with_id(&doc_id, body)).await?;
    tracing::info!("✓ Created document {} at {:?}", doc_id, created.rev());

    let mut fetched = db.read(&doc_id).await?;
    fetched.insert("age", json!(43))?;
    let updated = db.update(fetched).await?;
    tracing::info!("✓ Updated document {} to {:?}", doc_id, updated.rev());

    let index = db
        .create_json_index(
            &JsonIndex::new()
                .name(SAMPLE_INDEX)
                .design_doc(SAMPLE_DESIGN_DOC)
                .field(SortField::asc("age")),
        )
        .await?;
    tracing::info!("✓ Index {} in {} ({})", index.name, index.design_doc, index.result);

    for index in db.list_indexes().await? {
        tracing::info!(
            "  Index {} [{}] in {:?}: {} field(s)",
            index.name,
            index.index_type,
            index.design_doc,
            index.fields.len() + index.text_fields.len()
        );
    }

    let query = FindQuery::new(json!({"age": {"$gt": 40}}))
        .sort(SortField::asc("age"))
        .limit(10);
    let page = db.query_page(&query).await?;
    tracing::info!("✓ Query matched {} document(s)", page.docs.len());
    for doc in &page.docs {
        tracing::info!("  {:?} -> {}", doc.id(), serde_json::Value::Object(doc.body().clone()));
    }

    db.delete_index(SAMPLE_INDEX, SAMPLE_DESIGN_DOC, IndexType::Json)
        .await?;
    tracing::info!("✓ Index {} deleted", SAMPLE_INDEX);

    let updated_rev = updated
        .rev()
        .context("update response carried no revision")?;
    let tombstone = db.delete_document(&doc_id, updated_rev).await?;
    tracing::info!("✓ Deleted document {} (tombstone {})", doc_id, tombstone);

    tracing::info!("couchlink sample finished");
    Ok(())
}
