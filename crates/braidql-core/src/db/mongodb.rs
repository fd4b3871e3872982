//! MongoDB database adapter.
//!
//! Schema introspection samples documents per collection instead of
//! reading a catalog; execution runs aggregation pipelines with a document
//! cap and a strict collection-name allow-list that blocks operator-like
//! tokens and system-namespace access.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::traits::{DatabaseAdapter, PoolSettings};
use super::types::{CollectionSchema, DatabaseSchema, DatabaseType, FieldSchema, JsonRow};
use crate::error::{BraidQLError, Result};
use crate::plan::{DatabaseQuery, QueryBody, QueryKind};

/// Documents sampled per collection during introspection.
const SAMPLE_SIZE: usize = 50;

/// Distinct example values kept per field.
const MAX_EXAMPLES: usize = 3;

/// Example values are truncated to this many characters.
const MAX_EXAMPLE_LEN: usize = 50;

/// Health-check ping deadline.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-operation socket deadline; the driver has no per-command timeout.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Allow-list for collection names.
static VALID_COLLECTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("collection name pattern is valid")
});

/// MongoDB adapter with sampled introspection and pipeline execution.
pub struct MongoAdapter {
    client:  Client,
    db:      Database,
    db_name: String,
    schema:  OnceCell<DatabaseSchema>,
}

impl MongoAdapter {
    /// Create a connected adapter.
    ///
    /// The post-connect ping is verified but non-fatal: an unreachable
    /// server logs a warning and the adapter is handed out anyway, since
    /// the driver reconnects lazily.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionPool` when the URL cannot be parsed or the
    /// client cannot be constructed.
    pub async fn connect(url: &str, settings: PoolSettings) -> Result<Self> {
        let mut options =
            ClientOptions::parse(url).await.map_err(|e| BraidQLError::ConnectionPool {
                message: format!("Failed to parse MongoDB URL: {e}"),
            })?;
        options.server_selection_timeout = Some(settings.connect_timeout);
        options.connect_timeout = Some(settings.connect_timeout);
        options.min_pool_size = Some(settings.min_conns as u32);
        options.max_pool_size = Some(settings.max_conns as u32);
        options.max_idle_time = Some(settings.idle_close);
        options.retry_reads = Some(true);
        options.retry_writes = Some(true);

        let db_name = options
            .default_database
            .clone()
            .unwrap_or_else(|| "test".to_string());

        let client = Client::with_options(options).map_err(|e| BraidQLError::ConnectionPool {
            message: format!("Failed to create MongoDB client: {e}"),
        })?;
        let db = client.database(&db_name);

        let admin_db = client.database("admin");
        let ping = admin_db.run_command(doc! {"ping": 1});
        match tokio::time::timeout(settings.connect_timeout, ping).await {
            Ok(Ok(_)) => debug!(database = %db_name, "mongodb ping ok"),
            Ok(Err(e)) => warn!(database = %db_name, error = %e, "mongodb ping failed"),
            Err(_) => warn!(database = %db_name, "mongodb ping timed out"),
        }

        Ok(Self {
            client,
            db,
            db_name,
            schema: OnceCell::new(),
        })
    }

    /// Validate a collection name against the allow-list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCollectionName` for empty names, `system.`-prefixed
    /// names, names containing NUL or `$`, and anything outside
    /// `^[A-Za-z_][A-Za-z0-9_]*$`.
    pub fn validate_collection_name(name: &str) -> Result<()> {
        let reject = || BraidQLError::InvalidCollectionName {
            name: name.to_string(),
        };

        if name.is_empty() || name.starts_with("system.") {
            return Err(reject());
        }
        if name.contains('\0') || name.contains('$') {
            return Err(reject());
        }
        if !VALID_COLLECTION_NAME.is_match(name) {
            return Err(reject());
        }
        Ok(())
    }

    async fn introspect_once(&self) -> Result<DatabaseSchema> {
        let names = self
            .db
            .list_collection_names()
            .await
            .map_err(|e| BraidQLError::SchemaIntrospection {
                message: format!("Failed to list collections: {e}"),
            })?;

        let mut collections = BTreeMap::new();
        for name in names {
            let descriptor = match self.sample_collection(&name).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    // One broken collection must not abort the whole
                    // introspection; it just shows up empty.
                    warn!(collection = %name, error = %e, "collection introspection failed");
                    CollectionSchema::default()
                },
            };
            collections.insert(name, descriptor);
        }

        Ok(DatabaseSchema::Document {
            name: self.db_name.clone(),
            collections,
        })
    }

    async fn sample_collection(&self, name: &str) -> Result<CollectionSchema> {
        let coll = self.db.collection::<Document>(name);

        let cursor = coll
            .find(doc! {})
            .limit(SAMPLE_SIZE as i64)
            .await
            .map_err(|e| BraidQLError::SchemaIntrospection {
                message: format!("Failed to sample collection '{name}': {e}"),
            })?;
        let documents: Vec<Document> =
            cursor.try_collect().await.map_err(|e| BraidQLError::SchemaIntrospection {
                message: format!("Failed to read sample from '{name}': {e}"),
            })?;

        let mut fields: BTreeMap<String, FieldSchema> = BTreeMap::new();
        for document in &documents {
            for (key, value) in document {
                let entry = fields.entry(key.clone()).or_insert_with(|| FieldSchema {
                    type_name: bson_type_name(value).to_string(),
                    nullable:  matches!(value, Bson::Null),
                    examples:  Vec::new(),
                });
                if matches!(value, Bson::Null) {
                    entry.nullable = true;
                    continue;
                }
                if entry.examples.len() < MAX_EXAMPLES {
                    let example: String = display_bson(value).chars().take(MAX_EXAMPLE_LEN).collect();
                    if !entry.examples.contains(&example) {
                        entry.examples.push(example);
                    }
                }
            }
        }

        let count = coll.count_documents(doc! {}).await.unwrap_or_else(|e| {
            warn!(collection = %name, error = %e, "count_documents failed");
            0
        });
        let indexes = coll.list_index_names().await.unwrap_or_else(|e| {
            warn!(collection = %name, error = %e, "list_indexes failed");
            Vec::new()
        });

        Ok(CollectionSchema {
            fields,
            count,
            indexes,
        })
    }
}

#[async_trait]
impl DatabaseAdapter for MongoAdapter {
    async fn execute(&self, query: &DatabaseQuery, max_rows: usize) -> Result<Vec<JsonRow>> {
        if query.kind != QueryKind::Document {
            return Err(BraidQLError::UnsupportedQuery {
                message: format!("mongodb adapter cannot execute {:?} queries", query.kind),
            });
        }
        let QueryBody::Pipeline(stages) = &query.body else {
            return Err(BraidQLError::UnsupportedQuery {
                message: "document query body must be a pipeline".to_string(),
            });
        };
        let collection =
            query.collection.as_deref().ok_or_else(|| BraidQLError::MissingCollection {
                database: query.database.clone(),
            })?;
        Self::validate_collection_name(collection)?;

        let mut pipeline: Vec<Document> = Vec::with_capacity(stages.len() + 1);
        for stage in stages {
            pipeline.push(mongodb::bson::to_document(stage).map_err(|e| {
                BraidQLError::UnsupportedQuery {
                    message: format!("pipeline stage is not a document: {e}"),
                }
            })?);
        }

        ensure_pipeline_limit(&mut pipeline, max_rows);

        let coll = self.db.collection::<Document>(collection);
        let run = async {
            let cursor = coll.aggregate(pipeline).await.map_err(map_driver_error)?;
            cursor
                .try_collect::<Vec<Document>>()
                .await
                .map_err(map_driver_error)
        };
        let documents = tokio::time::timeout(OPERATION_TIMEOUT, run)
            .await
            .map_err(|_| {
                BraidQLError::timeout("mongodb aggregate", OPERATION_TIMEOUT.as_millis() as u64)
            })??;

        if documents.len() >= max_rows {
            warn!(
                max_docs = max_rows,
                collection,
                "query returned maximum documents; results may be truncated"
            );
        }

        Ok(documents.into_iter().map(document_to_row).collect())
    }

    async fn introspect_schema(&self) -> Result<DatabaseSchema> {
        self.schema.get_or_try_init(|| self.introspect_once()).await.cloned()
    }

    async fn disconnect(&self) {
        // The driver shuts its monitor tasks down on drop; nothing else
        // holds the client once the factory releases it.
        self.client.clone().shutdown().await;
    }

    async fn health_check(&self) -> bool {
        let admin_db = self.client.database("admin");
        let ping = admin_db.run_command(doc! {"ping": 1});
        matches!(tokio::time::timeout(HEALTH_CHECK_TIMEOUT, ping).await, Ok(Ok(_)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MongoDB
    }
}

/// Cap unbounded pipelines instead of trusting the model: append a
/// `$limit` stage when none is present.
pub fn ensure_pipeline_limit(pipeline: &mut Vec<Document>, max_docs: usize) {
    if !pipeline.iter().any(|stage| stage.contains_key("$limit")) {
        debug!(max_docs, "appending $limit to pipeline without explicit limit");
        pipeline.push(doc! {"$limit": max_docs as i64});
    }
}

fn map_driver_error(e: mongodb::error::Error) -> BraidQLError {
    BraidQLError::Database {
        message:   format!("MongoDB operation failed: {e}"),
        sql_state: None,
    }
}

/// Convert a result document to a JSON row, stringifying the primary key
/// so the wire format is serialization-safe.
fn document_to_row(mut document: Document) -> JsonRow {
    if let Some(id) = document.get("_id").cloned() {
        let id = match id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::String(s) => s,
            other => display_bson(&other),
        };
        document.insert("_id", Bson::String(id));
    }

    match Bson::Document(document).into_relaxed_extjson() {
        serde_json::Value::Object(map) => map,
        _ => JsonRow::new(),
    }
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        _ => "unknown",
    }
}

/// Human-readable scalar form used for schema examples and key coercion.
fn display_bson(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt.try_to_rfc3339_string().unwrap_or_else(|_| dt.to_string()),
        other => other.to_string(),
    }
}
