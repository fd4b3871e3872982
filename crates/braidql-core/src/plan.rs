//! Request, plan, and result types for the orchestration pipeline.
//!
//! The model emits plans in a loose wire form; [`crate::llm::synthesizer`]
//! normalizes that into the strict types here. Everything in this module is
//! request-scoped and serializes with the public API field names
//! (`query_type`, `query`, `query_plan`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::types::JsonRow;
use crate::error::{BraidQLError, Result};

/// Maximum accepted intent length in characters.
pub const MAX_INTENT_LEN: usize = 5000;

/// Substrings (case-insensitive) that reject an intent outright.
///
/// Basic blacklist protection against prompt injection; matching is
/// deliberately dumb so it cannot be confused by clever phrasing around
/// the marker itself.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    "ignore all",
    "ignore previous",
    "ignore the above",
    "ignore your instructions",
    "ignore your previous instructions",
    "forget your instructions",
    "forget what you are doing",
    "do not follow your instructions",
    "disregard",
    "system:",
    "assistant:",
    "you are now",
    "you are a new assistant",
    "your new instructions are",
    "pretend you are",
];

/// A natural-language query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Natural language query or structured intent (1..5000 chars).
    pub intent: String,

    /// Additional opaque context forwarded by the caller.
    #[serde(default)]
    pub context: Option<Value>,

    /// Generate the plan but execute nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Skip the model-driven safety validation pass.
    #[serde(default)]
    pub skip_validation: bool,
}

impl QueryRequest {
    /// Validate and normalize the intent field.
    ///
    /// Returns the trimmed intent on success.
    ///
    /// # Errors
    ///
    /// Returns [`BraidQLError::InvalidIntent`] when the intent is empty,
    /// whitespace-only, too long, or matches the injection blacklist.
    pub fn validate_intent(&self) -> Result<&str> {
        let trimmed = self.intent.trim();
        if trimmed.is_empty() {
            return Err(BraidQLError::invalid_intent("Intent cannot be empty or whitespace only"));
        }
        if self.intent.chars().count() > MAX_INTENT_LEN {
            return Err(BraidQLError::invalid_intent(format!(
                "Intent exceeds maximum length of {MAX_INTENT_LEN} characters"
            )));
        }

        let lowered = trimmed.to_lowercase();
        for pattern in SUSPICIOUS_PATTERNS {
            if lowered.contains(pattern) {
                return Err(BraidQLError::invalid_intent(format!(
                    "Intent contains suspicious pattern: '{pattern}'. Please rephrase your query."
                )));
            }
        }

        Ok(trimmed)
    }
}

/// Which engine a sub-query targets.
///
/// Serialized with the public API names (`sql`, `mongodb`, `cross-db`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Parameterized SQL against the relational engine.
    #[serde(rename = "sql")]
    Relational,
    /// Aggregation pipeline against the document engine.
    #[serde(rename = "mongodb")]
    Document,
    /// Declared by the model as spanning multiple databases.
    #[serde(rename = "cross-db")]
    Cross,
}

/// Sub-query body: a SQL string or a pipeline of stage objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryBody {
    /// SQL text with `$1..$n` placeholders.
    Sql(String),
    /// Ordered document-pipeline stages.
    Pipeline(Vec<Value>),
}

impl QueryBody {
    /// True when the body is a pipeline.
    #[must_use]
    pub const fn is_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline(_))
    }
}

/// One executable sub-query of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseQuery {
    /// Adapter key this sub-query runs against (`postgres` / `mongodb`).
    pub database: String,

    /// Normalized query kind.
    #[serde(rename = "query_type")]
    pub kind: QueryKind,

    /// SQL text or pipeline stages.
    #[serde(rename = "query")]
    pub body: QueryBody,

    /// Positional parameters for relational queries.
    #[serde(default)]
    pub parameters: Vec<Value>,

    /// Target collection; required for document queries.
    #[serde(default)]
    pub collection: Option<String>,

    /// Model's row estimate, advisory only.
    #[serde(default)]
    pub estimated_rows: Option<u64>,
}

/// A validated, model-synthesized execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Databases the plan reads from.
    pub databases: Vec<String>,
    /// Sub-queries in execution (and merge) order.
    pub queries:   Vec<DatabaseQuery>,
}

/// Metadata attached to every query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// The plan that produced this result.
    #[serde(rename = "query_plan")]
    pub plan: QueryPlan,

    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: f64,

    /// Number of rows in `data` after post-processing.
    pub rows_returned: usize,

    /// Request trace identifier.
    pub trace_id: String,

    /// When the result was produced (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Unified tabular result of one orchestrated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result rows, merged across sub-queries in plan order.
    pub data:     Vec<JsonRow>,
    /// Execution metadata.
    pub metadata: QueryMetadata,
}

/// Per-caller security policy applied to synthesis and post-processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Authenticated user identifier.
    pub user_id: String,

    /// Caller role forwarded to the prompt.
    pub role: String,

    /// Owning account, when known.
    #[serde(default)]
    pub account_id: Option<String>,

    /// Permission strings forwarded to the prompt.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// table -> column -> required value; the model must fold these into
    /// generated predicates.
    #[serde(default)]
    pub row_filters: HashMap<String, HashMap<String, Value>>,

    /// table -> fields replaced with the mask literal after execution.
    #[serde(default)]
    pub field_masks: HashMap<String, Vec<String>>,
}
