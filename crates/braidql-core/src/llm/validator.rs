//! Model-driven safety review of generated sub-queries.
//!
//! Each sub-query gets a second model call with a fixed security-review
//! prompt. The verdict parser fails closed: if the model's answer cannot
//! be read, the query is treated as unsafe with high severity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::extract::extract_json;
use super::transport::{GenerationParams, ModelTransport};
use crate::db::types::DatabaseSchema;
use crate::error::{BraidQLError, Result};
use crate::plan::DatabaseQuery;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Severity reported by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational findings only.
    #[default]
    Low,
    /// Worth attention; not blocking by itself.
    Medium,
    /// Blocking.
    High,
}

/// Outcome of one sub-query review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Whether the query is safe to execute.
    ///
    /// Defaults to `true` when the model omits the field; a missing field
    /// on an otherwise well-formed verdict is not a failure.
    #[serde(default = "default_safe")]
    pub safe: bool,

    /// Issues found.
    #[serde(default)]
    pub issues: Vec<String>,

    /// Overall severity.
    #[serde(default)]
    pub severity: Severity,

    /// Optional improvement suggestions.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

const fn default_safe() -> bool {
    true
}

impl Severity {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl ValidationVerdict {
    /// The fail-closed verdict used when the model's answer is unreadable.
    #[must_use]
    pub fn fail_closed(reason: &str) -> Self {
        Self {
            safe:        false,
            issues:      vec![format!("failed to parse validation: {reason}")],
            severity:    Severity::High,
            suggestions: Vec::new(),
        }
    }
}

/// Reviews sub-queries for injection, destructive operations, scan risk,
/// and schema mismatches.
pub struct PlanValidator {
    transport: Arc<dyn ModelTransport>,
    models:    Vec<String>,
    retry:     RetryPolicy,
    params:    GenerationParams,
}

impl PlanValidator {
    /// Validator over the same model chain as the synthesizer.
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

    /// Review one sub-query against its database schema.
    ///
    /// # Errors
    ///
    /// Returns `ModelTransport` only when every model in the chain is
    /// unreachable; unreadable answers return a fail-closed verdict
    /// instead of an error.
    pub async fn validate(
        &self,
        query: &DatabaseQuery,
        schema: &DatabaseSchema,
    ) -> Result<ValidationVerdict> {
        let prompt = build_validation_prompt(query, schema);
        let mut last_err: Option<BraidQLError> = None;

        for model in &self.models {
            let response = retry_with_backoff(&self.retry, BraidQLError::is_transport, || {
                self.transport.generate(model, &prompt, &self.params)
            })
            .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(model = %model, error = %e, "validator model failed; trying next in chain");
                    last_err = Some(e);
                    continue;
                },
            };

            let text: String = response
                .candidates
                .first()
                .map(|candidate| {
                    candidate
                        .parts
                        .iter()
                        .filter_map(|part| part.text.as_deref())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();

            return Ok(parse_verdict(&text));
        }

        Err(last_err.unwrap_or_else(|| BraidQLError::config("no models configured")))
    }
}

/// Parse the model's verdict, failing closed on anything unreadable.
fn parse_verdict(text: &str) -> ValidationVerdict {
    match extract_json(text.trim()) {
        Ok(value) => match serde_json::from_value::<ValidationVerdict>(value) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "validation verdict had unexpected shape");
                ValidationVerdict::fail_closed(&e.to_string())
            },
        },
        Err(e) => {
            error!(error = %e, "validation response was not JSON");
            ValidationVerdict::fail_closed(&e.to_string())
        },
    }
}

fn build_validation_prompt(query: &DatabaseQuery, schema: &DatabaseSchema) -> String {
    let query_json = serde_json::to_string(&query.body).unwrap_or_default();
    let schema_json = serde_json::to_string(schema).unwrap_or_default();
    let kind = serde_json::to_string(&query.kind).unwrap_or_default();

    format!(
        r#"You are a database security expert. Validate this query for safety and correctness.

QUERY TYPE: {kind}
QUERY: {query_json}
SCHEMA: {schema_json}

Check for:
1. SQL/NoSQL injection vulnerabilities
2. Dangerous operations (DROP, TRUNCATE, DELETE without WHERE)
3. Performance issues (missing indexes, full table scans)
4. Schema mismatches
5. Missing constraints

Return JSON:
{{
    "safe": true/false,
    "issues": ["list of issues found"],
    "severity": "low/medium/high",
    "suggestions": ["performance/security suggestions"]
}}"#
    )
}
