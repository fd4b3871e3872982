//! Query-plan synthesis from natural-language intent.
//!
//! Builds a deterministic prompt from the introspected schemas and the
//! caller's security context, invokes the model through an ordered
//! fallback chain, and coerces the free-form response into a strict
//! [`QueryPlan`].
//!
//! Fallback semantics: transport errors retry on the same model first,
//! then the next model in the chain is tried. `InvalidPlan` never falls
//! back — a model that answered with the wrong shape is a semantic
//! failure, and a second opinion would only mask it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::extract::{extract_json, strip_thought_block};
use super::transport::{GenerationParams, GenerateResponse, ModelTransport};
use crate::cache::stable_string;
use crate::db::types::DatabaseSchema;
use crate::error::{BraidQLError, Result};
use crate::plan::{DatabaseQuery, QueryBody, QueryKind, QueryPlan, SecurityContext};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Row cap the prompt asks the model to honor.
const PROMPT_ROW_LIMIT: usize = 1000;

/// Operators whose presence in a string body marks it as a document query.
const DOCUMENT_OPERATORS: &[&str] = &["$match", "$group", "$project", "$limit", "$sort", "$lookup"];

/// Synthesizes execution plans with model fallback.
pub struct PlanSynthesizer {
    transport: Arc<dyn ModelTransport>,
    models:    Vec<String>,
    retry:     RetryPolicy,
    params:    GenerationParams,
}

impl PlanSynthesizer {
    /// Synthesizer over an ordered `[preferred, fallback, ...]` model
    /// chain; duplicates are removed preserving first occurrence.
    #[must_use]
    pub fn new(transport: Arc<dyn ModelTransport>, models: Vec<String>) -> Self {
        let mut seen = Vec::new();
        for model in models {
            if !seen.contains(&model) {
                seen.push(model);
            }
        }
        Self {
            transport,
            models: seen,
            retry: RetryPolicy::for_model_calls(),
            params: GenerationParams::default(),
        }
    }

    /// Generate a complete query plan from an intent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPlan`/`InvalidJson` for semantic failures,
    /// `ModelTransport` when every model in the chain is exhausted, and
    /// `Configuration` when no models are configured.
    pub async fn generate(
        &self,
        intent: &str,
        schemas: &HashMap<String, DatabaseSchema>,
        security_ctx: &SecurityContext,
    ) -> Result<QueryPlan> {
        let prompt = build_prompt(intent, schemas, security_ctx);
        let mut last_err: Option<BraidQLError> = None;

        for model in &self.models {
            debug!(model = %model, intent_chars = intent.len(), "generating query plan");
            let attempt = retry_with_backoff(&self.retry, BraidQLError::is_transport, || {
                self.transport.generate(model, &prompt, &self.params)
            })
            .await
            .and_then(process_response);

            match attempt {
                Ok(plan) => return Ok(plan),
                // Semantic failure: the model understood the request and
                // produced a wrong plan. Do not ask another model.
                Err(e @ BraidQLError::InvalidPlan { .. }) => return Err(e),
                Err(e) => {
                    warn!(model = %model, error = %e, "model failed; trying next in chain");
                    last_err = Some(e);
                },
            }
        }

        Err(last_err.unwrap_or_else(|| BraidQLError::config("no models configured")))
    }
}

/// Flatten a transport response and coerce it into a plan.
fn process_response(response: GenerateResponse) -> Result<QueryPlan> {
    let candidate = response.candidates.first().ok_or_else(|| BraidQLError::InvalidJson {
        message: "No candidates in model response".to_string(),
    })?;

    let text_parts: Vec<&str> = candidate
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .filter(|text| !text.is_empty())
        .collect();
    if text_parts.is_empty() {
        return Err(BraidQLError::InvalidJson {
            message: "No text content in model response parts".to_string(),
        });
    }

    let response_text = text_parts.join("\n");
    let (response_text, thought) = strip_thought_block(response_text.trim());
    if let Some(thought) = thought {
        info!(thought = %thought, "model reasoning");
    }

    let raw = extract_json(&response_text)?;
    normalize_plan(raw)
}

/// Validate the extracted JSON structurally and normalize it into a plan.
fn normalize_plan(raw: Value) -> Result<QueryPlan> {
    let Value::Object(top) = raw else {
        return Err(BraidQLError::invalid_plan("top level of model output is not an object"));
    };

    // Bare operator snippets (e.g. `{"$sum": 1}`) and half-shaped answers
    // die here, before anything downstream can misread them.
    let Some(Value::Array(raw_databases)) = top.get("databases") else {
        return Err(BraidQLError::invalid_plan("'databases' is missing or not an array"));
    };
    let Some(Value::Array(raw_queries)) = top.get("queries") else {
        return Err(BraidQLError::invalid_plan("'queries' is missing or not an array"));
    };
    if raw_queries.is_empty() {
        return Err(BraidQLError::invalid_plan("plan contains no queries"));
    }

    let mut databases: Vec<String> = raw_databases
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_lowercase)
        .collect();

    let mut queries = Vec::with_capacity(raw_queries.len());
    for entry in raw_queries {
        let query = normalize_query(entry)?;
        if !databases.contains(&query.database) {
            debug!(database = %query.database, "adding database missing from plan header");
            databases.push(query.database.clone());
        }
        queries.push(query);
    }

    Ok(QueryPlan { databases, queries })
}

fn normalize_query(entry: &Value) -> Result<DatabaseQuery> {
    let Value::Object(obj) = entry else {
        return Err(BraidQLError::invalid_plan("query entry is not an object"));
    };

    let explicit = obj
        .get("query_type")
        .and_then(Value::as_str)
        .map(str::to_lowercase);
    let body_value = obj.get("query").cloned().unwrap_or(Value::Null);
    let mut database = obj
        .get("database")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    let kind = infer_kind(explicit.as_deref(), &body_value, &database);

    if database.is_empty() {
        database = match kind {
            QueryKind::Document => "mongodb".to_string(),
            QueryKind::Relational | QueryKind::Cross => "postgres".to_string(),
        };
    }

    let body = match body_value {
        Value::String(sql) => QueryBody::Sql(sql),
        Value::Array(stages) => QueryBody::Pipeline(stages),
        other => {
            return Err(BraidQLError::invalid_plan(format!(
                "query body must be a string or an array of stages, got {other}"
            )));
        },
    };

    let parameters = obj
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let collection = obj
        .get("collection")
        .and_then(Value::as_str)
        .map(str::to_string);
    let estimated_rows = obj.get("estimated_rows").and_then(Value::as_u64);

    Ok(DatabaseQuery {
        database,
        kind,
        body,
        parameters,
        collection,
        estimated_rows,
    })
}

/// The kind-inference ladder: explicit tags first, then body shape, body
/// content, database name, and finally body shape again as the default.
fn infer_kind(explicit: Option<&str>, body: &Value, database: &str) -> QueryKind {
    match explicit {
        Some("mongodb" | "aggregation" | "mongo" | "nosql") => QueryKind::Document,
        Some("sql") => QueryKind::Relational,
        Some("cross-db" | "cross_db") => QueryKind::Cross,
        _ => {
            if body.is_array() {
                QueryKind::Document
            } else if body
                .as_str()
                .is_some_and(|s| DOCUMENT_OPERATORS.iter().any(|op| s.contains(op)))
            {
                QueryKind::Document
            } else if database == "mongodb" {
                QueryKind::Document
            } else {
                // Relational-prefixed database names and plain SQL strings;
                // array bodies were classified above.
                QueryKind::Relational
            }
        },
    }
}

/// Compact, deterministic prompt: schemas and policy serialized with
/// sorted keys so identical inputs always produce identical prompts.
fn build_prompt(
    intent: &str,
    schemas: &HashMap<String, DatabaseSchema>,
    security_ctx: &SecurityContext,
) -> String {
    let schemas_json = stable_string(&serde_json::to_value(schemas).unwrap_or_default());
    let filters_json = stable_string(&serde_json::to_value(&security_ctx.row_filters).unwrap_or_default());
    let masks_json = stable_string(&serde_json::to_value(&security_ctx.field_masks).unwrap_or_default());

    format!(
        r#"Generate optimized database queries from the user intent.

SCHEMAS:
{schemas_json}

CONTEXT: role={role}, account={account}, perms={perms:?}
FILTERS: {filters_json}
MASKS: {masks_json}

INTENT: "{intent}"

RULES: PostgreSQL uses $1/$2 parameter placeholders; MongoDB uses aggregation pipeline stages ($match/$group/...). Apply the row filters and project masked fields under table-unique names. Cap results at {row_limit} rows. Prefer indexed columns in predicates.

IMPORTANT: query_type must be exactly one of: "sql", "mongodb", or "cross-db"
- Use "sql" for PostgreSQL queries
- Use "mongodb" for MongoDB aggregation pipelines
- Use "cross-db" only for queries spanning multiple databases
- "database" must be "postgres" or "mongodb"

REQUIRED FIELDS:
- For MongoDB queries: "collection" is REQUIRED and must match a collection name from the schema
- For PostgreSQL queries: "collection" must be null
- "query": SQL string for PostgreSQL, array of pipeline stages for MongoDB
- "parameters": array of SQL parameters (empty array [] for MongoDB)

You may think first inside a single optional <thought>...</thought> block. After it, return exactly one fenced JSON block:
```json
{{"databases":["postgres"],"queries":[{{"database":"postgres","query_type":"sql","query":"SELECT * FROM table WHERE col=$1 LIMIT {row_limit}","parameters":["val"],"estimated_rows":100,"collection":null}}]}}
```
For MongoDB:
```json
{{"databases":["mongodb"],"queries":[{{"database":"mongodb","query_type":"mongodb","query":[{{"$match":{{"city":"lagos"}}}},{{"$limit":{row_limit}}}],"parameters":[],"estimated_rows":100,"collection":"users"}}]}}
```
No other text after the JSON block."#,
        role = security_ctx.role,
        account = security_ctx.account_id.as_deref().unwrap_or("-"),
        perms = security_ctx.permissions,
        row_limit = PROMPT_ROW_LIMIT,
    )
}
